//! Filters classifying captured stacks as known-benign.
//!
//! A filter returning `true` excludes the stack from leak consideration.
//! The defaults cover background goroutines the runtime and the test
//! harness keep alive on their own; they are an explicit, enumerable list
//! assembled by [`default_filters`], not hidden global state. States are
//! matched only by the specific prefixes each filter cares about — the
//! state vocabulary belongs to the runtime and is not validated here.

use crate::stack::Stack;

/// Predicate deciding whether a stack is excluded from leak consideration.
pub type Filter = Box<dyn Fn(&Stack) -> bool + Send + Sync>;

/// The built-in filter chain, in evaluation order.
pub(crate) fn default_filters() -> Vec<Filter> {
    vec![
        Box::new(is_test_stack),
        Box::new(is_syscall_stack),
        Box::new(is_std_signal_stack),
        Box::new(is_trace_stack),
    ]
}

/// Background goroutines the testing package runs while user tests execute.
///
/// `RunTests` drives serial tests from the main goroutine, `(*T).Run` and
/// `(*T).Parallel` park while subtests run, and the two fuzzing drivers
/// block until their corpus is exhausted. All of them wait on a channel, so
/// a harness goroutine in any other state is not excluded.
fn is_test_stack(s: &Stack) -> bool {
    matches!(
        s.first_function(),
        "testing.RunTests"
            | "testing.(*T).Run"
            | "testing.(*T).Parallel"
            | "testing.runFuzzing"
            | "testing.runFuzzTests"
    ) && s.state().starts_with("chan receive")
}

/// Native-interop plumbing: a goroutine parked in a syscall with nothing of
/// the program's own on its stack.
fn is_syscall_stack(s: &Stack) -> bool {
    s.first_function() == "runtime.goexit" && s.state().starts_with("syscall")
}

/// Signal-delivery machinery. Importing signal handling starts a background
/// goroutine whose top function has been renamed across runtime versions,
/// and registering a handler spawns one via `ensureSigM`.
fn is_std_signal_stack(s: &Stack) -> bool {
    matches!(
        s.first_function(),
        "os/signal.signal_recv" | "os/signal.loop"
    ) || s.full().contains("runtime.ensureSigM")
}

/// Execution-trace reader goroutine kept alive while tracing is enabled.
fn is_trace_stack(s: &Stack) -> bool {
    s.first_function() == "runtime.chansend" && s.has_function("runtime.ReadTrace")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::StackParser;

    fn stack(header: &str, body: &str) -> Stack {
        let dump = format!("{header}\n{body}");
        let (mut stacks, errors) = StackParser::new(&dump).parse();
        assert!(errors.is_empty(), "bad test fixture: {errors:?}");
        stacks.remove(0)
    }

    #[test]
    fn test_test_stack_excluded_when_waiting_on_channel() {
        let s = stack(
            "goroutine 2 [chan receive]:",
            "testing.(*T).Run(0xc000082600)\n\ttesting/testing.go:1 +0x1\n",
        );
        assert!(is_test_stack(&s));
    }

    #[test]
    fn test_test_stack_not_excluded_in_other_state() {
        let s = stack(
            "goroutine 2 [running]:",
            "testing.(*T).Run(0xc000082600)\n\ttesting/testing.go:1 +0x1\n",
        );
        assert!(!is_test_stack(&s));
    }

    #[test]
    fn test_non_harness_function_not_excluded() {
        let s = stack(
            "goroutine 2 [chan receive]:",
            "main.worker()\n\tmain.go:1 +0x1\n",
        );
        assert!(!is_test_stack(&s));
    }

    #[test]
    fn test_syscall_stack() {
        let s = stack(
            "goroutine 6 [syscall, locked to thread]:",
            "runtime.goexit()\n\truntime/asm_amd64.s:1 +0x1\n",
        );
        assert!(is_syscall_stack(&s));

        let running = stack(
            "goroutine 6 [running]:",
            "runtime.goexit()\n\truntime/asm_amd64.s:1 +0x1\n",
        );
        assert!(!is_syscall_stack(&running));
    }

    #[test]
    fn test_signal_stack_by_top_function() {
        for func in ["os/signal.signal_recv", "os/signal.loop"] {
            let s = stack(
                "goroutine 5 [syscall]:",
                &format!("{func}()\n\tos/signal/signal_unix.go:1 +0x1\n"),
            );
            assert!(is_std_signal_stack(&s), "{func} should be excluded");
        }
    }

    #[test]
    fn test_signal_stack_by_setup_marker() {
        let s = stack(
            "goroutine 5 [chan receive]:",
            "os/signal.process(0x0)\n\tos/signal/signal.go:1 +0x1\ncreated by runtime.ensureSigM\n\truntime/signal_unix.go:1 +0x1\n",
        );
        assert!(is_std_signal_stack(&s));
    }

    #[test]
    fn test_trace_stack() {
        let s = stack(
            "goroutine 9 [chan send]:",
            "runtime.chansend(0x0)\n\truntime/chan.go:1 +0x1\nruntime.ReadTrace()\n\truntime/trace.go:1 +0x1\n",
        );
        assert!(is_trace_stack(&s));

        let plain = stack(
            "goroutine 9 [chan send]:",
            "runtime.chansend(0x0)\n\truntime/chan.go:1 +0x1\n",
        );
        assert!(!is_trace_stack(&plain));
    }
}
