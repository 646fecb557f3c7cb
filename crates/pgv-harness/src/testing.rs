//! Scripted command runner for unit tests.

use crate::exec::{CommandOutput, CommandRunner, Invocation};
use pgv_error::Result;
use std::collections::VecDeque;
use std::sync::Mutex;

type Handler = Box<dyn Fn(&Invocation) -> CommandOutput + Send>;

enum Script {
    Always(CommandOutput),
    Sequence(Mutex<VecDeque<CommandOutput>>),
    Handler(Handler),
}

/// Records every invocation and answers from a script.
pub struct ScriptedRunner {
    script: Script,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn always(output: CommandOutput) -> Self {
        Self::with_script(Script::Always(output))
    }

    /// Answers in order; once exhausted every call exits 0 with no output.
    pub fn sequence(outputs: Vec<CommandOutput>) -> Self {
        Self::with_script(Script::Sequence(Mutex::new(outputs.into())))
    }

    pub fn handler(handler: impl Fn(&Invocation) -> CommandOutput + Send + 'static) -> Self {
        Self::with_script(Script::Handler(Box::new(handler)))
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(invocation.clone());
        Ok(match &self.script {
            Script::Always(output) => output.clone(),
            Script::Sequence(queue) => queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| CommandOutput::exited(0)),
            Script::Handler(handler) => handler(invocation),
        })
    }
}
