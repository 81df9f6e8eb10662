use std::collections::BTreeSet;

use serde::Serialize;

use leadflow_core::flows::definition::FlowType;

const FALLBACK_RESPONSE: &str = "I'm not sure I understood that. You can ask about our \
services, pricing, the areas we cover, onboarding, careers, or how to reach us.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Services,
    Pricing,
    Locations,
    Onboarding,
    Careers,
    Contact,
    Greeting,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Services => "services",
            Self::Pricing => "pricing",
            Self::Locations => "locations",
            Self::Onboarding => "onboarding",
            Self::Careers => "careers",
            Self::Contact => "contact",
            Self::Greeting => "greeting",
        }
    }

    /// Guided flow that can pick up where the canned answer leaves off.
    pub fn suggested_flow(&self) -> Option<FlowType> {
        match self {
            Self::Pricing => Some(FlowType::GeneralAssessment),
            Self::Onboarding => Some(FlowType::ManagementSignup),
            Self::Careers => Some(FlowType::CareersApplication),
            Self::Contact => Some(FlowType::Connect),
            Self::Services | Self::Locations | Self::Greeting => None,
        }
    }
}

/// One FAQ entry. Keywords are lowercase words or multi-word phrases; a phrase
/// hit scores double.
#[derive(Clone, Debug)]
pub struct IntentRule {
    pub intent: Intent,
    pub keywords: Vec<&'static str>,
    pub response: &'static str,
}

impl IntentRule {
    fn score(&self, tokens: &BTreeSet<String>, padded_text: &str) -> u32 {
        self.keywords
            .iter()
            .map(|keyword| {
                if keyword.contains(' ') {
                    if padded_text.contains(&format!(" {keyword} ")) {
                        2
                    } else {
                        0
                    }
                } else if tokens.contains(*keyword) {
                    1
                } else {
                    0
                }
            })
            .sum()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IntentReply {
    pub intent: Option<Intent>,
    pub score: u32,
    pub response: String,
    pub suggested_flow: Option<FlowType>,
}

#[derive(Clone, Debug)]
pub struct IntentResponder {
    rules: Vec<IntentRule>,
}

impl Default for IntentResponder {
    fn default() -> Self {
        Self::builtin()
    }
}

impl IntentResponder {
    pub fn new(rules: Vec<IntentRule>) -> Self {
        Self { rules }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_rules())
    }

    pub fn rules(&self) -> &[IntentRule] {
        &self.rules
    }

    /// Picks the rule with the highest keyword score. Ties go to the rule
    /// listed first; a zero score everywhere yields the fallback answer.
    pub fn respond(&self, text: &str) -> IntentReply {
        let normalized_text = normalize_text(text);
        let tokens = tokenize(&normalized_text);
        let padded_text = format!(" {} ", tokens.iter().cloned().collect::<Vec<_>>().join(" "));
        let token_set = tokens.into_iter().collect::<BTreeSet<_>>();

        let mut best: Option<(&IntentRule, u32)> = None;
        for rule in &self.rules {
            let score = rule.score(&token_set, &padded_text);
            if score == 0 {
                continue;
            }
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((rule, score));
            }
        }

        match best {
            Some((rule, score)) => IntentReply {
                intent: Some(rule.intent),
                score,
                response: rule.response.to_string(),
                suggested_flow: rule.intent.suggested_flow(),
            },
            None => IntentReply {
                intent: None,
                score: 0,
                response: FALLBACK_RESPONSE.to_string(),
                suggested_flow: None,
            },
        }
    }
}

fn builtin_rules() -> Vec<IntentRule> {
    vec![
        IntentRule {
            intent: Intent::Pricing,
            keywords: vec![
                "price", "prices", "pricing", "cost", "costs", "fee", "fees", "commission",
                "charge", "how much",
            ],
            response: "Our management fee is a percentage of booking revenue and depends on \
                the property and the services you need. Tell us about your property and we \
                will send you a free assessment.",
        },
        IntentRule {
            intent: Intent::Onboarding,
            keywords: vec![
                "onboard", "onboarding", "start", "signup", "register", "join", "sign up",
                "get started", "list my",
            ],
            response: "Getting started takes a few minutes: share your property locations and \
                the platforms you use, and an account manager will schedule an onboarding call.",
        },
        IntentRule {
            intent: Intent::Careers,
            keywords: vec![
                "job", "jobs", "career", "careers", "hiring", "position", "vacancy", "apply",
                "work for",
            ],
            response: "We are always looking for hosts, cleaners, and operations people. You \
                can apply right here and attach your resume.",
        },
        IntentRule {
            intent: Intent::Locations,
            keywords: vec![
                "where", "location", "locations", "city", "cities", "area", "areas", "region",
                "country", "operate",
            ],
            response: "We currently manage short-term rentals across Portugal, including \
                Lisbon, Porto, and the Algarve, and we are expanding to new regions.",
        },
        IntentRule {
            intent: Intent::Services,
            keywords: vec![
                "service", "services", "manage", "management", "cleaning", "maintenance",
                "guest", "guests", "listing", "offer", "what do you do",
            ],
            response: "We take care of everything from listing optimisation and dynamic pricing \
                to guest communication, cleaning, and maintenance, so your property earns \
                without the daily work.",
        },
        IntentRule {
            intent: Intent::Contact,
            keywords: vec![
                "contact", "email", "phone", "call", "reach", "talk", "speak", "human",
                "get in touch",
            ],
            response: "You can leave your details and a short message here and our team will \
                get back to you within one business day.",
        },
        IntentRule {
            intent: Intent::Greeting,
            keywords: vec!["hi", "hello", "hey", "hola", "ola", "good morning", "good afternoon"],
            response: "Hello! How can I help you with your property today?",
        },
    ]
}

pub(crate) fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}

pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.chars()
        .map(|ch| if ch.is_alphanumeric() { ch } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}
