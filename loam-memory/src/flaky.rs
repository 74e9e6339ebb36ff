use loam_core::{Connection, DbError, Driver, Parameters, RowLabeled};
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc, PoisonError, RwLock,
};

#[derive(Default)]
struct Faults {
    connects: AtomicU32,
    executes: AtomicU32,
    fetches: AtomicU32,
    /// Restrict execute faults to statements containing this fragment.
    fragment: RwLock<Option<String>>,
}

/// Consumes one failure from `counter`, if any are left.
fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
        .is_ok()
}

/// Fault-injecting wrapper around another driver, for exercising the
/// engine's retry budget: fails a configured number of connects, statement
/// executions or fetches before letting the inner driver work.
pub struct FlakyDriver {
    inner: Arc<dyn Driver>,
    faults: Arc<Faults>,
}

impl FlakyDriver {
    pub fn new(inner: Arc<dyn Driver>) -> Self {
        Self {
            inner,
            faults: Arc::new(Faults::default()),
        }
    }

    pub fn fail_connects(&self, count: u32) {
        self.faults.connects.store(count, Ordering::SeqCst);
    }

    pub fn fail_executes(&self, count: u32) {
        self.faults.executes.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` executions of statements containing
    /// `fragment`. Pass `u32::MAX` to keep failing them.
    pub fn fail_executes_matching(&self, fragment: &str, count: u32) {
        *self
            .faults
            .fragment
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(fragment.to_string());
        self.faults.executes.store(count, Ordering::SeqCst);
    }

    pub fn fail_fetches(&self, count: u32) {
        self.faults.fetches.store(count, Ordering::SeqCst);
    }
}

impl Driver for FlakyDriver {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn connect(&self) -> Result<Box<dyn Connection>, DbError> {
        if take_one(&self.faults.connects) {
            return Err(DbError::new("injected connect failure"));
        }
        Ok(Box::new(FlakyConnection {
            inner: self.inner.connect()?,
            faults: self.faults.clone(),
        }))
    }
}

struct FlakyConnection {
    inner: Box<dyn Connection>,
    faults: Arc<Faults>,
}

impl FlakyConnection {
    fn execute_matches(&self, sql: &str) -> bool {
        self.faults
            .fragment
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            .is_none_or(|fragment| sql.contains(fragment))
    }
}

impl Connection for FlakyConnection {
    fn execute(&mut self, sql: &str, parameters: &Parameters) -> Result<u64, DbError> {
        if self.execute_matches(sql) && take_one(&self.faults.executes) {
            return Err(DbError::new("injected statement failure"));
        }
        self.inner.execute(sql, parameters)
    }

    fn fetch(&mut self, sql: &str, parameters: &Parameters) -> Result<Vec<RowLabeled>, DbError> {
        if take_one(&self.faults.fetches) {
            return Err(DbError::new("injected fetch failure"));
        }
        self.inner.fetch(sql, parameters)
    }

    fn begin(&mut self) -> Result<(), DbError> {
        self.inner.begin()
    }

    fn commit(&mut self) -> Result<(), DbError> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        self.inner.rollback()
    }
}
