//! Job table invariants under arbitrary register/remove/transition
//! sequences.

use std::collections::HashSet;

use nix::unistd::Pid;
use proptest::prelude::*;
use tsh::job::{JobState, JobTable, MAX_JOBS};

#[derive(Debug, Clone)]
enum Op {
    Insert { pid: i32, state: JobState },
    Remove { pid: i32 },
    SetState { pid: i32, state: JobState },
}

fn state() -> impl Strategy<Value = JobState> {
    prop_oneof![
        Just(JobState::Foreground),
        Just(JobState::Background),
        Just(JobState::Stopped),
    ]
}

fn op() -> impl Strategy<Value = Op> {
    // a small pid space so removes and transitions hit live jobs often
    prop_oneof![
        (-2i32..40, state()).prop_map(|(pid, state)| Op::Insert { pid, state }),
        (-2i32..40).prop_map(|pid| Op::Remove { pid }),
        (1i32..40, state()).prop_map(|(pid, state)| Op::SetState { pid, state }),
    ]
}

fn check_invariants(t: &JobTable) -> Result<(), TestCaseError> {
    let jobs = t.list();
    prop_assert!(jobs.len() <= MAX_JOBS);

    let jids: HashSet<i32> = jobs.iter().map(|j| j.jid).collect();
    prop_assert_eq!(jids.len(), jobs.len(), "duplicate job ids: {:?}", jobs);

    let pids: HashSet<i32> = jobs.iter().map(|j| j.pid.as_raw()).collect();
    prop_assert_eq!(pids.len(), jobs.len());
    prop_assert!(jobs.iter().all(|j| j.pid.as_raw() > 0));
    prop_assert!(
        jobs.iter().all(|j| (1..=MAX_JOBS as i32).contains(&j.jid)),
        "job id out of range: {:?}",
        jobs
    );

    let fg = jobs
        .iter()
        .filter(|j| j.state == JobState::Foreground)
        .count();
    prop_assert!(fg <= 1, "{} foreground jobs", fg);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn invariants_hold_for_any_sequence(ops in prop::collection::vec(op(), 1..120)) {
        let mut t = JobTable::new();
        for op in ops {
            match op {
                Op::Insert { pid, state } => {
                    // the shell never registers a pid twice
                    if t.find_by_pid(Pid::from_raw(pid)).is_none() {
                        let _ = t.insert(Pid::from_raw(pid), state, "cmd");
                    }
                }
                Op::Remove { pid } => {
                    if t.remove(Pid::from_raw(pid)) {
                        let max = t.iter().map(|j| j.jid).max().unwrap_or(0);
                        prop_assert_eq!(t.next_jid(), max + 1);
                    }
                }
                Op::SetState { pid, state } => {
                    let _ = t.set_state(Pid::from_raw(pid), state);
                }
            }
            check_invariants(&t)?;
        }
    }

    #[test]
    fn lookups_agree(pids in prop::collection::hash_set(1i32..10_000, 1..=MAX_JOBS)) {
        let mut t = JobTable::new();
        for &pid in &pids {
            t.insert(Pid::from_raw(pid), JobState::Background, "x").unwrap();
        }
        for &pid in &pids {
            let pid = Pid::from_raw(pid);
            let jid = t.pid_to_jid(pid).unwrap();
            prop_assert_eq!(t.find_by_jid(jid).unwrap().pid, pid);
        }
        prop_assert_eq!(t.foreground_pid(), None);
    }

    #[test]
    fn insert_fails_only_when_full(n in 0usize..=MAX_JOBS + 4) {
        let mut t = JobTable::new();
        for i in 0..n {
            let result = t.insert(Pid::from_raw(i as i32 + 1), JobState::Background, "x");
            prop_assert_eq!(result.is_ok(), i < MAX_JOBS);
        }
        prop_assert_eq!(t.len(), n.min(MAX_JOBS));
    }
}
