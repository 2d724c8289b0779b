use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::evaluation::{guarded, BoxError, Evaluate, EvaluationError, Mismatch};
use crate::expectation::{Expectation, ExpectationId};
use crate::request::Request;
use crate::response_template::ResponseTemplate;
use crate::verification::UnusedExpectation;

/// Hands out 1-based arrival order numbers.
#[derive(Debug, Default)]
pub(crate) struct SequenceCounter(AtomicU64);

impl SequenceCounter {
    pub(crate) fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn reset(&self) {
        self.0.store(0, Ordering::SeqCst);
    }
}

/// The pending expectations of a session, in registration order.
///
/// Every operation takes the lock for its whole duration: pending expectations are never
/// iterated while someone else is claiming or registering.
#[derive(Default)]
pub(crate) struct ExpectationSet {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    pending: BTreeMap<ExpectationId, Expectation>,
    next_id: u64,
}

/// What happened when a request tried to claim a pending expectation.
pub(crate) enum Claim {
    /// The expectation was removed from the pending set.
    Matched {
        id: ExpectationId,
        response: ResponseTemplate,
        order: u64,
    },
    /// The evaluator of `id` failed; the expectation stays pending.
    Faulted {
        id: ExpectationId,
        response: ResponseTemplate,
        order: u64,
        error: BoxError,
    },
    Unmatched {
        order: u64,
        candidates: Vec<RejectedCandidate>,
    },
}

/// A pending expectation that turned a request down, with every reason it gave.
#[derive(Debug, Clone)]
pub struct RejectedCandidate {
    pub(crate) id: ExpectationId,
    pub(crate) description: String,
    pub(crate) rejection: Rejection,
}

#[derive(Debug, Clone)]
pub(crate) enum Rejection {
    Mismatches(Vec<Mismatch>),
    /// The evaluator failed while explaining itself; only the message is kept.
    Fault(String),
}

impl RejectedCandidate {
    pub fn id(&self) -> ExpectationId {
        self.id
    }

    /// The rendered predicate group of the expectation.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Every dimension that did not match. Empty if explaining the rejection failed.
    pub fn mismatches(&self) -> &[Mismatch] {
        match &self.rejection {
            Rejection::Mismatches(mismatches) => mismatches,
            Rejection::Fault(_) => &[],
        }
    }
}

impl ExpectationSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // Evaluators run under `guarded`, a poisoned lock still holds a consistent map.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn add(
        &self,
        response: ResponseTemplate,
        evaluator: Box<dyn Evaluate>,
    ) -> ExpectationId {
        let mut state = self.lock();
        state.next_id += 1;
        let id = ExpectationId(state.next_id);
        let expectation = Expectation::new(response, evaluator);
        debug!("Registering {}:\n{}", id, expectation.description());
        state.pending.insert(id, expectation);
        id
    }

    /// Draw the arrival order of `request` and hand it the first pending expectation
    /// that accepts it.
    ///
    /// The order is drawn while holding the lock, so it matches the order in which requests
    /// are evaluated.
    pub(crate) fn claim(&self, request: &Request, counter: &SequenceCounter) -> Claim {
        let mut state = self.lock();
        let order = counter.next();

        let accepted = state.pending.iter().find_map(|(id, expectation)| {
            match guarded(|| expectation.evaluator.evaluate(request, order)) {
                Ok(()) => Some((*id, None)),
                Err(EvaluationError::Mismatch(_)) => None,
                Err(EvaluationError::Fault(error)) => Some((*id, Some(error))),
            }
        });

        match accepted {
            Some((id, None)) => {
                if let Some(expectation) = state.pending.remove(&id) {
                    return Claim::Matched {
                        id,
                        response: expectation.response,
                        order,
                    };
                }
            }
            Some((id, Some(error))) => {
                if let Some(expectation) = state.pending.get(&id) {
                    return Claim::Faulted {
                        id,
                        response: expectation.response.clone(),
                        order,
                        error,
                    };
                }
            }
            None => {}
        }

        let candidates = state
            .pending
            .iter()
            .map(|(id, expectation)| {
                let rejection = match guarded(|| expectation.evaluator.explain(request, order)) {
                    Ok(mismatches) => Rejection::Mismatches(mismatches),
                    Err(e) => Rejection::Fault(e.to_string()),
                };
                RejectedCandidate {
                    id: *id,
                    description: expectation.description(),
                    rejection,
                }
            })
            .collect();
        Claim::Unmatched { order, candidates }
    }

    /// A rendered snapshot of the expectations that have not been claimed yet.
    pub(crate) fn remaining(&self) -> Vec<UnusedExpectation> {
        self.lock()
            .pending
            .iter()
            .map(|(id, expectation)| UnusedExpectation {
                id: *id,
                description: expectation.description(),
                response: expectation.response.to_string(),
            })
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Drop every pending expectation. Ids keep increasing.
    pub(crate) fn clear(&self) {
        self.lock().pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RequestMatchers;
    use http::Method;

    fn get(path: &str) -> Request {
        Request::new(Method::GET, path).unwrap()
    }

    fn status_of(claim: &Claim) -> Option<u16> {
        match claim {
            Claim::Matched { response, .. } | Claim::Faulted { response, .. } => {
                Some(response.status().as_u16())
            }
            Claim::Unmatched { .. } => None,
        }
    }

    #[test]
    fn an_expectation_can_only_be_claimed_once() {
        let set = ExpectationSet::new();
        let counter = SequenceCounter::default();
        set.add(
            ResponseTemplate::new(200),
            Box::new(RequestMatchers::new().path_is("/once")),
        );

        assert_eq!(status_of(&set.claim(&get("/once"), &counter)), Some(200));
        assert!(matches!(
            set.claim(&get("/once"), &counter),
            Claim::Unmatched { order: 2, .. }
        ));
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn candidates_are_scanned_in_registration_order() {
        let set = ExpectationSet::new();
        let counter = SequenceCounter::default();
        let first = set.add(ResponseTemplate::new(200), Box::new(RequestMatchers::new()));
        let second = set.add(ResponseTemplate::new(201), Box::new(RequestMatchers::new()));

        assert!(first < second);
        assert_eq!(status_of(&set.claim(&get("/"), &counter)), Some(200));
        assert_eq!(status_of(&set.claim(&get("/"), &counter)), Some(201));
    }

    #[test]
    fn declared_order_wins_over_registration_order() {
        let set = ExpectationSet::new();
        let counter = SequenceCounter::default();
        set.add(
            ResponseTemplate::new(200),
            Box::new(RequestMatchers::new().path_is("/same").order_is(2)),
        );
        set.add(
            ResponseTemplate::new(201),
            Box::new(RequestMatchers::new().path_is("/same").order_is(1)),
        );

        assert_eq!(status_of(&set.claim(&get("/same"), &counter)), Some(201));
        assert_eq!(status_of(&set.claim(&get("/same"), &counter)), Some(200));
    }

    #[test]
    fn unmatched_requests_collect_every_reason() {
        let set = ExpectationSet::new();
        let counter = SequenceCounter::default();
        set.add(
            ResponseTemplate::new(200),
            Box::new(RequestMatchers::new().method_is("POST").path_is("/post")),
        );

        match set.claim(&get("/get"), &counter) {
            Claim::Unmatched { order, candidates } => {
                assert_eq!(order, 1);
                assert_eq!(candidates.len(), 1);
                assert_eq!(candidates[0].mismatches().len(), 2);
                assert!(candidates[0].description().contains("method: is <POST>"));
            }
            _ => panic!("Expected the request to be unmatched"),
        }
    }

    #[test]
    fn faulty_evaluators_leave_the_expectation_pending() {
        let set = ExpectationSet::new();
        let counter = SequenceCounter::default();
        let id = set.add(
            ResponseTemplate::new(202),
            Box::new(|_: &Request, _: u64| -> Result<(), EvaluationError> {
                panic!("evaluator exploded")
            }),
        );

        match set.claim(&get("/"), &counter) {
            Claim::Faulted {
                id: faulted,
                response,
                error,
                ..
            } => {
                assert_eq!(faulted, id);
                assert_eq!(response.status().as_u16(), 202);
                assert!(error.to_string().contains("evaluator exploded"));
            }
            _ => panic!("Expected a fault"),
        }
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn remaining_lists_unclaimed_expectations() {
        let set = ExpectationSet::new();
        let counter = SequenceCounter::default();
        set.add(
            ResponseTemplate::new(200),
            Box::new(RequestMatchers::new().path_is("/used")),
        );
        set.add(
            ResponseTemplate::new(404),
            Box::new(RequestMatchers::new().path_is("/unused")),
        );

        set.claim(&get("/used"), &counter);
        let remaining = set.remaining();

        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].description.contains("path: is \"/unused\""));
        set.clear();
        assert!(set.remaining().is_empty());
    }
}
