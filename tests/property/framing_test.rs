// tests/property/framing_test.rs

//! Request framing must not depend on how the transport splits the bytes.

use primegate::core::assembler::{FrameAssembler, MalformedReason, RequestState};
use primegate::core::identity::IdentityMinter;
use proptest::prelude::*;
use std::time::Duration;

const LIMIT: usize = 4096;

fn assembler() -> FrameAssembler {
    FrameAssembler::new(LIMIT, Duration::from_secs(60))
}

/// Splits `data` at the given cut points, which may be unsorted or repeated.
fn split_at_points(data: &[u8], mut cuts: Vec<usize>) -> Vec<&[u8]> {
    cuts.iter_mut().for_each(|c| *c %= data.len() + 1);
    cuts.sort_unstable();
    cuts.dedup();
    let mut chunks = Vec::new();
    let mut start = 0;
    for cut in cuts.into_iter().chain(std::iter::once(data.len())) {
        if cut > start {
            chunks.push(&data[start..cut]);
            start = cut;
        }
    }
    chunks
}

prop_compose! {
    fn request_head()(
        path in "/[a-z0-9_]{0,40}",
        query in proptest::option::of("[a-z]{1,10}=[0-9]{1,10}"),
        headers in proptest::collection::vec(("[A-Za-z-]{1,16}", "[a-zA-Z0-9 ;=/.]{0,32}"), 0..5),
    ) -> Vec<u8> {
        let mut head = format!("GET {path}");
        if let Some(q) = query {
            head.push('?');
            head.push_str(&q);
        }
        head.push_str(" HTTP/1.1\r\n");
        for (name, value) in headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        head.push_str("\r\n");
        head.into_bytes()
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 1000,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_any_chunking_yields_one_identical_request(
        request in request_head(),
        cuts in proptest::collection::vec(any::<usize>(), 0..12),
    ) {
        let mut assembler = assembler();
        let id = IdentityMinter::new().mint();
        let chunks = split_at_points(&request, cuts);
        let last = chunks.len() - 1;

        for (i, chunk) in chunks.into_iter().enumerate() {
            let state = assembler.feed(&id, chunk);
            if i < last {
                prop_assert_eq!(state, RequestState::Incomplete);
            } else {
                match state {
                    RequestState::Complete(raw) => prop_assert_eq!(raw.as_bytes(), &request[..]),
                    other => prop_assert!(false, "expected Complete, got {:?}", other),
                }
            }
        }
        prop_assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn test_input_without_terminator_never_completes(
        data in proptest::collection::vec(any::<u8>(), 1..LIMIT)
            .prop_filter("no terminator", |d| !d.windows(4).any(|w| w == b"\r\n\r\n")),
    ) {
        let mut assembler = assembler();
        let id = IdentityMinter::new().mint();
        prop_assert_eq!(assembler.feed(&id, &data), RequestState::Incomplete);
        prop_assert!(assembler.is_buffering(&id));
    }

    #[test]
    fn test_over_limit_input_is_rejected(
        filler in proptest::collection::vec(b'a'..=b'z', LIMIT + 1..LIMIT * 2),
        chunk_size in 1usize..512,
    ) {
        let mut assembler = assembler();
        let id = IdentityMinter::new().mint();
        let mut outcome = RequestState::Incomplete;
        for chunk in filler.chunks(chunk_size) {
            outcome = assembler.feed(&id, chunk);
            if outcome != RequestState::Incomplete {
                break;
            }
        }
        prop_assert_eq!(
            outcome,
            RequestState::Malformed(MalformedReason::TooLarge { limit: LIMIT })
        );
        prop_assert_eq!(assembler.pending(), 0);
    }
}
