//! Scripted runner for tests
//!
//! Responses are keyed by command-line prefix; the longest matching prefix
//! wins. Several responses registered for the same prefix are returned in
//! order, and the last one repeats once the queue is drained. Commands with
//! no matching rule succeed with empty output.

use super::{CommandResult, CommandRunner, Invocation};
use crate::error::{Error, Result};
use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;

#[derive(Debug)]
enum Scripted {
    Respond(CommandResult),
    Missing,
}

#[derive(Debug)]
struct Rule {
    prefix: String,
    queue: VecDeque<Scripted>,
}

/// A [`CommandRunner`] that replays canned results and records every call
#[derive(Debug, Default)]
pub struct FakeRunner {
    rules: RefCell<Vec<Rule>>,
    calls: RefCell<Vec<Invocation>>,
    detached: RefCell<Vec<Invocation>>,
    tools: RefCell<HashSet<String>>,
    fail_spawn: RefCell<bool>,
}

impl FakeRunner {
    /// Empty script: every command succeeds silently
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a result for commands starting with `prefix`
    pub fn respond(&self, prefix: &str, result: CommandResult) -> &Self {
        self.push(prefix, Scripted::Respond(result));
        self
    }

    /// Queue a successful result with the given stdout
    pub fn ok(&self, prefix: &str, stdout: &str) -> &Self {
        self.respond(prefix, CommandResult::ok(stdout))
    }

    /// Queue a failed result with the given output
    pub fn fail(&self, prefix: &str, output: &str) -> &Self {
        self.respond(prefix, CommandResult::failed(output))
    }

    /// Make commands starting with `prefix` fail to spawn
    pub fn missing(&self, prefix: &str) -> &Self {
        self.push(prefix, Scripted::Missing);
        self
    }

    /// Report `program` as resolvable on PATH
    pub fn with_tool(&self, program: &str) -> &Self {
        self.tools.borrow_mut().insert(program.to_string());
        self
    }

    /// Make every detached spawn fail
    pub fn fail_detached_spawns(&self) -> &Self {
        *self.fail_spawn.borrow_mut() = true;
        self
    }

    /// Command lines run so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().iter().map(Invocation::command_line).collect()
    }

    /// Full invocations run so far
    pub fn invocations(&self) -> Vec<Invocation> {
        self.calls.borrow().clone()
    }

    /// Command lines started in the background
    pub fn detached(&self) -> Vec<String> {
        self.detached.borrow().iter().map(Invocation::command_line).collect()
    }

    /// How many recorded commands start with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    /// Whether any recorded command starts with `prefix`
    pub fn ran(&self, prefix: &str) -> bool {
        self.count(prefix) > 0
    }

    fn push(&self, prefix: &str, scripted: Scripted) {
        let mut rules = self.rules.borrow_mut();
        if let Some(rule) = rules.iter_mut().find(|r| r.prefix == prefix) {
            rule.queue.push_back(scripted);
        } else {
            rules.push(Rule {
                prefix: prefix.to_string(),
                queue: VecDeque::from([scripted]),
            });
        }
    }

    fn next_for(&self, command_line: &str) -> Option<Scripted> {
        let mut rules = self.rules.borrow_mut();
        let rule = rules
            .iter_mut()
            .filter(|r| command_line.starts_with(&r.prefix))
            .max_by_key(|r| r.prefix.len())?;
        if rule.queue.len() > 1 {
            return rule.queue.pop_front();
        }
        rule.queue.front().map(|s| match s {
            Scripted::Respond(result) => Scripted::Respond(result.clone()),
            Scripted::Missing => Scripted::Missing,
        })
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandResult> {
        self.calls.borrow_mut().push(invocation.clone());
        match self.next_for(&invocation.command_line()) {
            Some(Scripted::Respond(result)) => Ok(result),
            Some(Scripted::Missing) => Err(Error::command_not_found(&invocation.program)),
            None => Ok(CommandResult::ok("")),
        }
    }

    fn spawn_detached(&self, invocation: &Invocation) -> Result<()> {
        self.detached.borrow_mut().push(invocation.clone());
        if *self.fail_spawn.borrow() {
            return Err(Error::command_not_found(&invocation.program));
        }
        Ok(())
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        self.tools
            .borrow()
            .contains(program)
            .then(|| PathBuf::from("/fake/bin").join(program))
    }
}
