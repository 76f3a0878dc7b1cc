//! Composition root.
//!
//! A [`KnowledgeBase`] declares the blackboard levels and the knowledge
//! sources. [`BlackboardSystem`] interns its names, builds the controller and
//! owns the client and trace sink for the duration of a run.

use std::thread::{self, JoinHandle};

use crate::blackboard::{Blackboard, BlackboardSnapshot};
use crate::cancel::CancelToken;
use crate::client::Client;
use crate::config::EngineConfig;
use crate::controller::{Controller, RunContext, RunReport};
use crate::error::Result;
use crate::source::KnowledgeSource;
use crate::symbol::SymbolTable;
use crate::trace::{NullTraceSink, TraceSink};

/// Content layer: everything a particular expert system declares.
pub trait KnowledgeBase {
    /// Levels and their default values. Levels are fixed after this call.
    fn init_blackboard(&self, symbols: &mut SymbolTable) -> Result<Blackboard>;

    /// Knowledge sources, in declaration order.
    fn init_knowledge_sources(&self, symbols: &mut SymbolTable) -> Result<Vec<KnowledgeSource>>;
}

pub struct BlackboardSystem {
    symbols: SymbolTable,
    controller: Controller,
    client: Box<dyn Client + Send>,
    trace: Box<dyn TraceSink + Send>,
    cancel: CancelToken,
    config: EngineConfig,
}

impl BlackboardSystem {
    pub fn new<K, C>(kb: &K, client: C, config: EngineConfig) -> Result<Self>
    where
        K: KnowledgeBase + ?Sized,
        C: Client + Send + 'static,
    {
        let mut symbols = SymbolTable::new();
        let blackboard = kb.init_blackboard(&mut symbols)?;
        let sources = kb.init_knowledge_sources(&mut symbols)?;

        let mut controller = Controller::new(blackboard, sources);
        controller.configure(&config);

        tracing::debug!(
            sources = controller.sources().len(),
            symbols = symbols.len(),
            "blackboard system initialized"
        );

        Ok(Self {
            symbols,
            controller,
            client: Box::new(client),
            trace: Box::new(NullTraceSink),
            cancel: CancelToken::new(),
            config,
        })
    }

    pub fn with_trace(mut self, trace: impl TraceSink + Send + 'static) -> Self {
        self.trace = Box::new(trace);
        self
    }

    /// Share a cancellation token with another component, e.g. a channel
    /// client created before the system.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the controller on the calling thread until it halts.
    pub fn execute(&mut self) -> Result<RunReport> {
        self.controller.execute(RunContext {
            symbols: &self.symbols,
            client: &mut *self.client,
            trace: &mut *self.trace,
            cancel: &self.cancel,
        })
    }

    /// Move the system onto a dedicated worker thread and run it there.
    ///
    /// The system comes back through [`RunHandle::join`] so the final
    /// blackboard can still be inspected.
    pub fn spawn(mut self) -> RunHandle {
        let cancel = self.cancel.clone();
        let join = thread::Builder::new()
            .name("kbs-controller".to_string())
            .spawn(move || {
                let outcome = self.execute();
                (self, outcome)
            });
        RunHandle { cancel, join }
    }

    /// Restore every level's defaults and reactivate every source.
    pub fn reset(&mut self) {
        self.cancel.reset();
        self.controller.reset();
    }

    pub fn blackboard(&self) -> &Blackboard {
        self.controller.blackboard()
    }

    pub fn snapshot(&self) -> BlackboardSnapshot {
        self.controller.snapshot()
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }
}

/// A run in progress on its own thread.
pub struct RunHandle {
    cancel: CancelToken,
    join: std::io::Result<JoinHandle<(BlackboardSystem, Result<RunReport>)>>,
}

impl RunHandle {
    /// Ask the controller to stop at its next cycle boundary or blocked query.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn join(self) -> anyhow::Result<(BlackboardSystem, Result<RunReport>)> {
        let handle = self.join?;
        handle
            .join()
            .map_err(|_| anyhow::anyhow!("controller thread panicked"))
    }
}
