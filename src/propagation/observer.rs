use std::sync::Mutex;

/// Receives the final outcome of each transaction an invocation owned.
///
/// Never called for joined, suspended or absent transactions.
pub trait TransactionObserver<H>: Send + Sync {
    fn transaction_committed(&self, handle: &H);

    fn transaction_rolled_back(&self, handle: &H);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<H> {
    Committed(H),
    RolledBack(H),
}

impl<H> Outcome<H> {
    pub fn handle(&self) -> &H {
        match self {
            Outcome::Committed(handle) | Outcome::RolledBack(handle) => handle,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, Outcome::Committed(_))
    }
}

/// Observer that keeps every outcome it is told about, in order
#[derive(Debug)]
pub struct OutcomeRecorder<H> {
    outcomes: Mutex<Vec<Outcome<H>>>,
}

impl<H: Clone> OutcomeRecorder<H> {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(Vec::new()),
        }
    }

    pub fn outcomes(&self) -> Vec<Outcome<H>> {
        match self.outcomes.lock() {
            Ok(outcomes) => outcomes.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn last(&self) -> Option<Outcome<H>> {
        self.outcomes().pop()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes().is_empty()
    }

    fn push(&self, outcome: Outcome<H>) {
        match self.outcomes.lock() {
            Ok(mut outcomes) => outcomes.push(outcome),
            Err(poisoned) => poisoned.into_inner().push(outcome),
        }
    }
}

impl<H: Clone> Default for OutcomeRecorder<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Clone + Send> TransactionObserver<H> for OutcomeRecorder<H> {
    fn transaction_committed(&self, handle: &H) {
        self.push(Outcome::Committed(handle.clone()));
    }

    fn transaction_rolled_back(&self, handle: &H) {
        self.push(Outcome::RolledBack(handle.clone()));
    }
}
