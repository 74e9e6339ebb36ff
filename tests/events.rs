mod support;

use loam::{EntityId, EntityListener, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use support::{manager, memory_driver, Customer};

#[derive(Default)]
struct Recorder {
    entries: Mutex<Vec<String>>,
}

impl Recorder {
    fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }
}

impl EntityListener for Recorder {
    fn begin_listing(&self, entity: &'static str, expected: i64) {
        self.entries
            .lock()
            .unwrap()
            .push(format!("begin {} {}", entity, expected));
    }

    fn entity_loaded(&self, entity: &'static str, identifier: Option<&EntityId>) {
        self.entries.lock().unwrap().push(match identifier {
            Some(id) => format!("loaded {} {}", entity, id),
            None => format!("loaded {}", entity),
        });
    }

    fn end_listing(&self, entity: &'static str, actual: i64) {
        self.entries
            .lock()
            .unwrap()
            .push(format!("end {} {}", entity, actual));
    }

    fn operation_complete(&self, operation: &str, success: bool, _elapsed: Duration) {
        self.entries
            .lock()
            .unwrap()
            .push(format!("op {} {}", operation, success));
    }
}

#[test]
fn listings_and_loads_are_observable() {
    let driver = memory_driver();
    let em = manager(&driver);
    let recorder = Arc::new(Recorder::default());
    em.subscribe(recorder.clone());

    em.persist(Customer {
        name: "Watched".into(),
        status: "active".into(),
        ..Customer::default()
    })
    .unwrap();
    let entries = recorder.entries();
    assert!(entries.iter().any(|e| e.starts_with("op Persist:Customer true")));
    assert!(entries.iter().any(|e| e.starts_with("loaded Customer")));

    let found = em
        .find_by::<Customer>(&[("Status", Value::Varchar(Some("active".into())))])
        .unwrap()
        .unwrap();
    assert_eq!(found.len(), 1);
    let entries = recorder.entries();
    assert!(entries.contains(&"begin Customer 1".to_string()));
    assert!(entries.contains(&"end Customer 1".to_string()));
}

#[test]
fn empty_listings_report_a_zero_count() {
    let driver = memory_driver();
    let em = manager(&driver);
    let recorder = Arc::new(Recorder::default());
    em.subscribe(recorder.clone());

    let none = em
        .find_by::<Customer>(&[("Status", Value::Varchar(Some("nope".into())))])
        .unwrap();
    assert!(none.is_none());
    let entries = recorder.entries();
    assert!(entries.contains(&"begin Customer 0".to_string()));
    assert!(entries.contains(&"end Customer 0".to_string()));
}

#[test]
fn failed_operations_report_failure() {
    let driver = memory_driver();
    let flaky = Arc::new(loam_memory::FlakyDriver::new(driver.clone()));
    let em = loam::EntityManager::new(flaky.clone());
    let recorder = Arc::new(Recorder::default());
    em.subscribe(recorder.clone());

    flaky.fail_connects(u32::MAX);
    assert!(em
        .persist(Customer {
            name: "Unlucky".into(),
            ..Customer::default()
        })
        .is_err());
    let entries = recorder.entries();
    assert!(entries.iter().any(|e| e.starts_with("op Persist:Customer false")));
}
