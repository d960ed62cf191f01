/*
 * Kiln - Confined Tool-Calling Agent
 * File Path: src/agent_loop.rs
 * Responsibility: Conversation turns: model request, tool-call execution, result replay.
 */

use crate::dispatch::Dispatcher;
use crate::llm::{self, FunctionCall, ResponsesClient};
use serde_json::Value;
use std::path::PathBuf;

/// Operator-controlled session switches. The model can never change these.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub working_directory: PathBuf,
    pub allow_unsafe: bool,
    pub verbose: bool,
    pub use_functions: bool,
    pub max_turns: usize,
}

/// Conversation history sent with every request.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    input: Vec<Value>,
}

impl Conversation {
    pub fn new(system_prompt: &str) -> Self {
        Self {
            input: vec![llm::system_message(system_prompt)],
        }
    }

    pub fn items(&self) -> &[Value] {
        &self.input
    }

    pub fn push_user(&mut self, query: &str) {
        self.input.push(llm::user_message(query));
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = Value>) {
        self.input.extend(items);
    }

    pub fn push(&mut self, item: Value) {
        self.input.push(item);
    }
}

/// Runs one user query to completion and returns the model's final text.
pub async fn run_turn(
    client: &ResponsesClient,
    dispatcher: &mut Dispatcher,
    conversation: &mut Conversation,
    session: &SessionState,
    query: &str,
) -> anyhow::Result<String> {
    conversation.push_user(query);
    let max_turns = session.max_turns.max(1);
    let mut turn = 0;

    loop {
        turn += 1;
        let tools = session
            .use_functions
            .then(|| dispatcher.registry().tool_definitions(session.allow_unsafe));

        let response = client.create(conversation.items(), tools.as_ref()).await?;
        conversation.extend(response.output.iter().cloned());

        if !session.use_functions || response.function_calls.is_empty() {
            return Ok(response.output_text);
        }

        execute_function_calls(dispatcher, conversation, &response.function_calls, session).await;

        if turn >= max_turns {
            tracing::warn!(max_turns, "tool-call round limit reached");
            let mut text = response.output_text;
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&format!("[Stopped after {} tool-call rounds.]", max_turns));
            return Ok(text);
        }
    }
}

/// Dispatches each call in order and appends its output item.
pub async fn execute_function_calls(
    dispatcher: &mut Dispatcher,
    conversation: &mut Conversation,
    calls: &[FunctionCall],
    session: &SessionState,
) {
    for call in calls {
        let output = dispatcher
            .dispatch(
                &call.name,
                &call.arguments,
                &session.working_directory,
                session.allow_unsafe,
                session.verbose,
            )
            .await;
        if session.verbose {
            println!("→ Result: [{} characters]", output.len());
        }
        conversation.push(llm::function_call_output(&call.call_id, &output));
    }
}
