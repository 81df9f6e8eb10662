use std::sync::Arc;

use leadflow_core::audit::InMemoryAuditSink;
use leadflow_core::flows::{
    EngineSettings, FlowCatalog, FlowEngine, FlowState, FlowStep, FlowType, InputKind, StepInput,
    StepResult, Validator,
};
use leadflow_core::sanitize::sanitize_text;
use leadflow_core::validation::ValidationError;
use leadflow_core::FileUpload;

fn valid_answer(step: &FlowStep) -> StepInput {
    match (&step.input_kind, step.validator) {
        (InputKind::File, _) => {
            StepInput::File(FileUpload::new("resume.pdf", "application/pdf", b"%PDF-1.7".to_vec()))
        }
        (InputKind::Choice { options, .. }, _) => StepInput::from(options[0].as_str()),
        (_, Some(Validator::Name)) => StepInput::from("Ana Sousa"),
        (_, Some(Validator::Email)) => StepInput::from("ana@x.com"),
        (_, Some(Validator::Url)) => StepInput::from("https://www.linkedin.com/in/ana"),
        (_, Some(Validator::PositiveInteger)) => StepInput::from("3"),
        (_, None) => StepInput::from("Lisbon, Porto"),
    }
}

fn engine() -> (FlowEngine, FlowCatalog) {
    let catalog = FlowCatalog::builtin().expect("builtin catalog is valid");
    let engine = FlowEngine::new(
        catalog.clone(),
        EngineSettings::default(),
        Arc::new(InMemoryAuditSink::default()),
    );
    (engine, catalog)
}

#[test]
fn every_flow_reaches_awaiting_submission_after_its_last_step() {
    let (mut engine, catalog) = engine();

    for flow_type in FlowType::ALL {
        let definition = catalog.get(flow_type).expect("flow type is registered");
        engine.start(flow_type).expect("start");

        for (index, step) in definition.steps().iter().enumerate() {
            assert_eq!(engine.state(), &FlowState::InProgress { step_index: index });
            let result = engine.submit_step_input(valid_answer(step)).expect("input handled");
            if index + 1 == definition.len() {
                assert!(matches!(result, StepResult::ReadyToSubmit(_)), "{flow_type}: {result:?}");
            } else {
                assert_eq!(result, StepResult::Advanced { step_index: index + 1 });
            }
        }

        assert_eq!(engine.state(), &FlowState::AwaitingSubmission);
        assert_eq!(engine.cursor(), Some(definition.len()));
        assert_eq!(engine.record().len(), definition.len());
        engine.reset();
    }
}

#[test]
fn required_steps_never_advance_on_blank_input() {
    let (mut engine, catalog) = engine();

    for flow_type in FlowType::ALL {
        let definition = catalog.get(flow_type).expect("flow type is registered");
        engine.start(flow_type).expect("start");

        for (index, step) in definition.steps().iter().enumerate() {
            if !step.optional {
                let result = engine.submit_step_input("   ").expect("input handled");
                assert!(matches!(result, StepResult::Rejected(ValidationError::MissingRequired { .. })));
                assert_eq!(engine.state(), &FlowState::InProgress { step_index: index });
            }
            engine.submit_step_input(valid_answer(step)).expect("input handled");
        }
        engine.reset();
    }
}

#[test]
fn skipping_optional_steps_leaves_no_entry() {
    let (mut engine, catalog) = engine();

    for flow_type in FlowType::ALL {
        let definition = catalog.get(flow_type).expect("flow type is registered");
        engine.start(flow_type).expect("start");

        for step in definition.steps() {
            if step.optional {
                engine.skip().expect("optional step can be skipped");
                assert!(!engine.record().contains(step.field.as_str()));
            } else {
                engine.submit_step_input(valid_answer(step)).expect("input handled");
            }
        }

        assert_eq!(engine.state(), &FlowState::AwaitingSubmission);
        let required = definition.steps().iter().filter(|step| !step.optional).count();
        assert_eq!(engine.record().len(), required);
        engine.reset();
    }
}

#[test]
fn accepted_text_is_stored_exactly_as_sanitized() {
    let (mut engine, _) = engine();
    engine.start(FlowType::Waitlist).expect("start");
    engine.submit_step_input("Ana").expect("name");
    engine.submit_step_input("ana@x.com").expect("email");

    let raw = "  Rua <i>Augusta</i> 12, Lisboa\t ";
    engine.submit_step_input(raw).expect("location");

    assert_eq!(engine.record().text("location"), Some(sanitize_text(raw).as_str()));
    assert_eq!(engine.record().text("location"), Some("Rua Augusta 12, Lisboa"));
}

#[test]
fn sanitizer_is_idempotent_on_hostile_samples() {
    let samples = [
        "<script>alert('x')</script>",
        "javajavascript:script:alert(1)",
        "a < b > c",
        "<<img src=x onerror=alert(1)>>",
        "line\u{0007}break\nkept",
        "VBScript:msgbox",
        "plain text",
    ];
    for sample in samples {
        let once = sanitize_text(sample);
        assert_eq!(sanitize_text(&once), once, "sample: {sample:?}");
    }
}
