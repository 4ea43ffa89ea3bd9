// tests/property/pipeline_test.rs

//! Invariants of the built-in stages and of whole-pipeline evaluation.

use bytes::Bytes;
use primegate::config::PipelineConfig;
use primegate::core::events::{Topic, WorkUnit};
use primegate::core::identity::IdentityMinter;
use primegate::core::pipeline::stages::HalvingStage;
use primegate::core::pipeline::stages::primality::smallest_factor;
use primegate::core::pipeline::{Pipeline, PipelineStage, StageOutcome};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_smallest_factor_is_the_least_divisor(n in 2u64..200_000) {
        let factor = smallest_factor(n);
        prop_assert_eq!(n % factor, 0);
        prop_assert!((2..factor).all(|d| n % d != 0));
    }

    #[test]
    fn test_halving_keeps_a_shrinking_prefix(payload in proptest::collection::vec(any::<u8>(), 1..512)) {
        let unit = WorkUnit::new(IdentityMinter::new().mint(), Bytes::from(payload.clone()));
        match HalvingStage::default().process(unit) {
            StageOutcome::Forward(next) => {
                prop_assert_eq!(next.payload.len(), payload.len() / 2 + 1);
                prop_assert!(payload.starts_with(&next.payload));
            }
            StageOutcome::Terminal(event) => prop_assert!(false, "unexpected {:?}", event),
        }
    }

    #[test]
    fn test_prime_pipeline_answers_every_number(n in 2u64..1_000_000, token in any::<u32>()) {
        let pipeline = Pipeline::from_config(&PipelineConfig::default());
        let request = format!("GET /is_prime?possible_prime={n} HTTP/1.0\r\n\r\n");
        let unit = WorkUnit::new(IdentityMinter::starting_at(token).mint(), request);

        let event = pipeline.run_to_completion(unit.clone());
        prop_assert_eq!(event.topic, Topic::Success);
        prop_assert_eq!(&event.identity, &unit.identity);
        let expected = smallest_factor(n).to_string();
        prop_assert_eq!(&event.payload[..], expected.as_bytes());
        prop_assert_eq!(&pipeline.run_to_completion(unit), &event);
    }
}
