mod common;

use chainlab::component::RunState;
use chainlab::orchestrator::ChainRunError;
use chainlab::{Chain, Component, ComponentKind, ComponentOutput, Orchestrator, StopHandle};
use common::RecordingBackend;

fn text_input(title: &str, text: &str) -> Component {
    let mut component = Component::new(ComponentKind::TextInput, title);
    component.user_input = Some(text.to_string());
    component
}

#[test]
fn earlier_outputs_are_substituted_into_later_inputs() -> anyhow::Result<()> {
    let backend = RecordingBackend::new();
    let mut chain = Chain::from_components(vec![
        text_input("Greeting", "Hi"),
        Component::new(ComponentKind::Output, "Output 1").with_input("{Greeting}!"),
    ])?;

    let report = Orchestrator::new(&backend).run(&mut chain, &StopHandle::new())?;

    assert_eq!(report.executed.len(), 2);
    assert!(!report.stopped);
    let output = &chain.components()[1];
    assert_eq!(output.output, Some(ComponentOutput::from("Hi!")));
    assert_eq!(output.status.processed_input.as_deref(), Some("Hi!"));
    assert_eq!(backend.call_count(), 0);
    Ok(())
}

#[test]
fn model_receives_processed_input() -> anyhow::Result<()> {
    let backend = RecordingBackend::new();
    let mut chain = Chain::from_components(vec![
        text_input("Topic", "rust"),
        Component::new(ComponentKind::OpenAi, "Model 1").with_input("Write about {Topic}"),
        Component::new(ComponentKind::Output, "Output 1").with_input("{Model 1}"),
    ])?;

    let report = Orchestrator::new(&backend).run(&mut chain, &StopHandle::new())?;

    assert_eq!(
        *backend.calls.lock().unwrap(),
        vec!["complete:Write about rust".to_string()]
    );
    assert_eq!(
        chain.components()[2].output,
        Some(ComponentOutput::from("echo: Write about rust"))
    );
    // Only the model and the output are app outputs; the text input is an app input.
    let titles: Vec<_> = report.outputs.iter().map(|o| o.title.as_str()).collect();
    assert_eq!(titles, vec!["Model 1", "Output 1"]);
    Ok(())
}

#[test]
fn failing_component_halts_the_chain() -> anyhow::Result<()> {
    let backend = RecordingBackend::failing_on("FAIL");
    let mut chain = Chain::from_components(vec![
        text_input("Input 1", "FAIL please"),
        Component::new(ComponentKind::OpenAi, "Model 1").with_input("{Input 1}"),
        Component::new(ComponentKind::Output, "Output 1").with_input("{Model 1}"),
    ])?;
    let model_id = chain.components()[1].id;
    let input_id = chain.components()[0].id;

    let err = Orchestrator::new(&backend)
        .run(&mut chain, &StopHandle::new())
        .unwrap_err();

    assert_eq!(err.component_id(), model_id);
    let ChainRunError::ComponentFailed {
        index, executed, ..
    } = &err;
    assert_eq!(*index, 1);
    assert_eq!(executed, &vec![input_id]);
    assert!(err.to_string().starts_with("Action 2 (Model 1) failed"));

    let components = chain.components();
    assert_eq!(components[0].output, Some(ComponentOutput::from("FAIL please")));
    assert_eq!(components[1].status.state, RunState::Failed);
    assert!(components[1].status.error.is_some());
    assert_eq!(components[2].output, None);
    assert_eq!(components[2].status.state, RunState::Idle);
    assert_eq!(backend.call_count(), 1);
    Ok(())
}

#[test]
fn stopping_mid_component_runs_nothing_after_it() -> anyhow::Result<()> {
    let stop = StopHandle::new();
    let backend = RecordingBackend::stopping(stop.clone());
    let mut chain = Chain::from_components(vec![
        Component::new(ComponentKind::OpenAi, "Model 1").with_input("first"),
        Component::new(ComponentKind::OpenAi, "Model 2").with_input("{Model 1}"),
    ])?;

    let report = Orchestrator::new(&backend).run(&mut chain, &stop)?;

    assert!(report.stopped);
    assert_eq!(report.executed, vec![chain.components()[0].id]);
    assert_eq!(chain.components()[1].output, None);
    assert_eq!(backend.call_count(), 1);
    assert!(!stop.is_running());
    Ok(())
}

#[test]
fn stop_after_last_component_is_not_a_stop() -> anyhow::Result<()> {
    let stop = StopHandle::new();
    let backend = RecordingBackend::stopping(stop.clone());
    let mut chain =
        Chain::from_components(vec![Component::new(ComponentKind::OpenAi, "Model 1")
            .with_input("only")])?;

    let report = Orchestrator::new(&backend).run(&mut chain, &stop)?;

    assert!(!report.stopped);
    assert_eq!(report.executed.len(), 1);
    Ok(())
}

#[test]
fn tokens_only_resolve_against_earlier_components() -> anyhow::Result<()> {
    let backend = RecordingBackend::new();
    let mut chain = Chain::from_components(vec![
        Component::new(ComponentKind::Output, "Output 1").with_input("{Model 1}"),
        Component::new(ComponentKind::OpenAi, "Model 1").with_input("hello"),
    ])?;

    Orchestrator::new(&backend).run(&mut chain, &StopHandle::new())?;

    assert_eq!(
        chain.components()[0].output,
        Some(ComponentOutput::from("{Model 1}"))
    );
    Ok(())
}

#[test]
fn tag_parser_extracts_from_model_output() -> anyhow::Result<()> {
    let backend = RecordingBackend::new();
    let mut chain = Chain::from_components(vec![
        Component::new(ComponentKind::OpenAi, "Model 1").with_input("<answer>42</answer>"),
        Component::new(ComponentKind::TagParser, "Parser 1")
            .with_input("{Model 1}")
            .with_parameter("extractPattern", serde_json::json!("answer")),
    ])?;

    Orchestrator::new(&backend).run(&mut chain, &StopHandle::new())?;

    assert_eq!(chain.components()[1].output, Some(ComponentOutput::from("42")));
    Ok(())
}

#[test]
fn rerunning_a_chain_replaces_previous_outputs() -> anyhow::Result<()> {
    let backend = RecordingBackend::new();
    let mut chain = Chain::from_components(vec![
        text_input("Input 1", "one"),
        Component::new(ComponentKind::Output, "Output 1").with_input("{Input 1}"),
    ])?;
    let orchestrator = Orchestrator::new(&backend);
    orchestrator.run(&mut chain, &StopHandle::new())?;

    let input_id = chain.components()[0].id;
    chain.set_user_input(input_id, "two")?;
    orchestrator.run(&mut chain, &StopHandle::new())?;

    assert_eq!(chain.components()[1].output, Some(ComponentOutput::from("two")));
    Ok(())
}

#[test]
fn self_references_stay_literal_across_runs() -> anyhow::Result<()> {
    let backend = RecordingBackend::new();
    let mut chain = Chain::from_components(vec![
        Component::new(ComponentKind::Output, "Output 1").with_input("{Output 1}"),
    ])?;
    let orchestrator = Orchestrator::new(&backend);

    orchestrator.run(&mut chain, &StopHandle::new())?;
    assert_eq!(
        chain.components()[0].output,
        Some(ComponentOutput::from("{Output 1}"))
    );

    // The component now holds an output, which must not feed its own input.
    orchestrator.run(&mut chain, &StopHandle::new())?;
    let output = &chain.components()[0];
    assert_eq!(output.status.processed_input.as_deref(), Some("{Output 1}"));
    assert_eq!(output.output, Some(ComponentOutput::from("{Output 1}")));
    Ok(())
}
