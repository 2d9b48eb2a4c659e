// tests/property_callbacks.rs

use std::rc::Rc;

use proptest::prelude::*;

use dk::params::Params;
use dk::runner::{Runner, RunnerOptions};
use dk::task::{Callback, CallbackSet, TaskRegistry};
use dk::types::Phase;
use dk_test_utils::{CallLog, ProbeTask};

fn callback() -> impl Strategy<Value = Callback> {
    ("[a-d]", proptest::option::of(0u8..3)).prop_map(|(task, n)| {
        let params = match n {
            Some(n) => Params::new().with("n", n),
            None => Params::new(),
        };
        Callback::new(task, params)
    })
}

proptest! {
    #[test]
    fn callback_set_is_first_seen_order_without_duplicates(
        callbacks in proptest::collection::vec(callback(), 0..24)
    ) {
        let set: CallbackSet = callbacks.iter().cloned().collect();

        let mut expected: Vec<Callback> = Vec::new();
        for cb in &callbacks {
            if !expected.contains(cb) {
                expected.push(cb.clone());
            }
        }
        prop_assert_eq!(set.to_vec(), expected);
    }

    #[test]
    fn each_distinct_callback_runs_exactly_once(
        dynamic in proptest::collection::vec("[a-d]", 0..8),
        class in proptest::collection::vec("[a-d]", 0..8),
    ) {
        let log = CallLog::new();
        let mut registry = TaskRegistry::new();
        for name in ["a", "b", "c", "d"] {
            registry.register(ProbeTask::new(name, &log).into_def(name));
        }
        let mut subject = ProbeTask::new("T", &log).into_def("T");
        for name in &class {
            subject = subject.before(name.as_str());
        }
        registry.register(subject);

        let mut runner = Runner::new(Rc::new(registry), RunnerOptions::default());
        for name in &dynamic {
            runner.add_task_callback(Phase::Before, "T", name.as_str(), Params::new());
        }
        runner.run("T", Params::new()).expect("run should succeed");

        let mut expected: Vec<String> = Vec::new();
        for name in class.iter().chain(&dynamic) {
            if !expected.contains(name) {
                expected.push(name.clone());
            }
        }
        expected.push("T".to_string());

        let started: Vec<String> = log
            .entries()
            .into_iter()
            .filter(|entry| !entry.ends_with(".end"))
            .collect();
        prop_assert_eq!(started, expected);
    }
}
