//! Property-based tests for the stack-dump parser.

use proptest::prelude::*;

use leakcheck::StackParser;

/// States observed in real dumps, plus qualifier-carrying variants.
fn arb_state() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("running".to_string()),
        Just("runnable".to_string()),
        Just("chan receive".to_string()),
        Just("chan receive, 2 minutes".to_string()),
        Just("select".to_string()),
        Just("syscall, locked to thread".to_string()),
        Just("IO wait".to_string()),
    ]
}

fn arb_func() -> impl Strategy<Value = String> {
    "[a-z]{1,8}(/[a-z]{1,8}){0,2}\\.[A-Za-z]{1,12}"
}

prop_compose! {
    fn arb_record()(id in 1u64..1_000_000, state in arb_state(), func in arb_func(), depth in 1usize..4) -> (u64, String) {
        let mut body = String::new();
        for frame in 0..depth {
            body.push_str(&format!("{func}{frame}(0xc000012345)\n\tsrc/file.go:{} +0x{:x}\n", frame + 1, frame + 10));
        }
        (id, format!("goroutine {id} [{state}]:\n{body}"))
    }
}

proptest! {
    /// N well-formed records parse to exactly N stacks, ids in input order.
    #[test]
    fn parse_preserves_record_count_and_order(records in prop::collection::vec(arb_record(), 0..20)) {
        let dump: String = records.iter().map(|(_, text)| text.as_str()).collect::<Vec<_>>().join("\n");
        let (stacks, errors) = StackParser::new(&dump).parse();

        prop_assert!(errors.is_empty(), "errors on well-formed dump: {errors:?}");
        prop_assert_eq!(stacks.len(), records.len());
        for (stack, (id, _)) in stacks.iter().zip(&records) {
            prop_assert_eq!(stack.id(), *id);
        }
    }

    /// Sorting parsed records by id is stable against input permutation.
    #[test]
    fn sort_by_id_is_input_order_independent(mut records in prop::collection::vec(arb_record(), 1..10)) {
        let forward: String = records.iter().map(|(_, t)| t.as_str()).collect::<Vec<_>>().join("\n");
        records.reverse();
        let reversed: String = records.iter().map(|(_, t)| t.as_str()).collect::<Vec<_>>().join("\n");

        let (mut a, _) = StackParser::new(&forward).parse();
        let (mut b, _) = StackParser::new(&reversed).parse();
        a.sort_by_key(|s| s.id());
        b.sort_by_key(|s| s.id());

        let ids_a: Vec<u64> = a.iter().map(|s| s.id()).collect();
        let ids_b: Vec<u64> = b.iter().map(|s| s.id()).collect();
        prop_assert_eq!(ids_a, ids_b);
    }

    /// The parser never panics on arbitrary text.
    #[test]
    fn parse_never_panics(text in "\\PC{0,400}") {
        let _ = StackParser::new(&text).parse();
    }
}
