//! Property tests: random read fragmentation, random write back-pressure.

use std::sync::Arc;

use proptest::prelude::*;

use super::buffer::PoolAllocator;
use super::machine::Connection;
use super::mock::{MockSource, ReadStep, WriteStep};
use super::processor::{CommandBuffer, CommandProcessor, Verdict};
use super::state::{Event, Op, Outcome, State};

/// Echoes the buffer back once it ends with a newline.
struct LineEcho;

impl CommandProcessor for LineEcho {
    fn process(&self, cmd: &mut CommandBuffer<'_>) -> Verdict {
        if cmd.received().ends_with(b"\n") {
            Verdict::ResponseReady
        } else {
            Verdict::Incomplete
        }
    }
}

fn lines() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(prop::collection::vec(b'a'..=b'z', 1..12), 1..5).prop_map(|lines| {
        let mut input = Vec::new();
        for line in lines {
            input.extend_from_slice(&line);
            input.push(b'\n');
        }
        input
    })
}

fn write_steps() -> impl Strategy<Value = Vec<WriteStep>> {
    prop::collection::vec(
        prop_oneof![(1usize..8).prop_map(WriteStep::Accept), Just(WriteStep::WouldBlock)],
        0..32,
    )
}

/// Splits `input` into reads of the given sizes, with a would-block after
/// every chunk whose flag is set, and a peer close at the end.
fn read_script(input: &[u8], sizes: &[usize], blocks: &[bool]) -> MockSource {
    let mut source = MockSource::new();
    let mut rest = input;
    let mut i = 0;
    while !rest.is_empty() {
        let n = sizes[i % sizes.len()].min(rest.len());
        source.push_read(ReadStep::Data(rest[..n].to_vec()));
        if blocks[i % blocks.len()] {
            source.push_read(ReadStep::WouldBlock);
        }
        rest = &rest[n..];
        i += 1;
    }
    source.push_read(ReadStep::Eof);
    source
}

proptest! {
    #[test]
    fn prop_partial_io_delivers_every_reply_once(
        input in lines(),
        sizes in prop::collection::vec(1usize..16, 1..16),
        blocks in prop::collection::vec(any::<bool>(), 1..16),
        writes in write_steps(),
        spurious in prop::collection::vec(any::<bool>(), 1..16),
    ) {
        let mut source = read_script(&input, &sizes, &blocks);
        for step in writes {
            source.push_write(step);
        }

        let allocator = Arc::new(PoolAllocator::new(64, 4));
        let mut conn = Connection::new(source, Arc::new(LineEcho), Arc::clone(&allocator));

        let mut outcome = Outcome::Continue;
        for round in 0..1000 {
            let event = match conn.interest() {
                Op::Write if round % 2 == 0 && spurious[round % spurious.len()] => Event::readable(),
                Op::Write => Event::writable(),
                _ => Event::readable(),
            };

            outcome = conn.dispatch(event).unwrap();
            if outcome.is_terminal() {
                break;
            }
            prop_assert!(conn.check_invariants());
            if conn.state() == State::Connected {
                prop_assert_eq!(conn.nbuf(), 0);
                prop_assert_eq!(conn.snbuf(), 0);
            }
        }

        prop_assert_eq!(outcome, Outcome::DropConnection);
        prop_assert_eq!(conn.source().written(), &input[..]);
        prop_assert_eq!(allocator.outstanding(), 0);

        drop(conn);
        prop_assert_eq!(allocator.outstanding(), 0);
    }

    #[test]
    fn prop_buffer_freed_exactly_once(
        input in lines(),
        sizes in prop::collection::vec(1usize..16, 1..16),
        blocks in prop::collection::vec(any::<bool>(), 1..16),
        stop_after in 0usize..8,
    ) {
        let source = read_script(&input, &sizes, &blocks);
        let allocator = Arc::new(PoolAllocator::new(64, 4));
        let mut conn = Connection::new(source, Arc::new(LineEcho), Arc::clone(&allocator));

        // Tear down at an arbitrary point, possibly mid-command.
        for _ in 0..stop_after {
            if conn.dispatch(Event::readable()).unwrap().is_terminal() {
                break;
            }
            prop_assert!(allocator.outstanding() <= 1);
        }

        drop(conn);
        prop_assert_eq!(allocator.outstanding(), 0);
    }

    #[test]
    fn prop_spurious_readable_is_noop(idle_events in 1usize..8) {
        let allocator = Arc::new(PoolAllocator::new(64, 4));
        let mut conn = Connection::new(MockSource::new(), Arc::new(LineEcho), Arc::clone(&allocator));

        for _ in 0..idle_events {
            prop_assert_eq!(conn.dispatch(Event::readable()).unwrap(), Outcome::Continue);
            prop_assert_eq!(conn.state(), State::Connected);
            prop_assert!(!conn.has_buffer());
            prop_assert_eq!(allocator.outstanding(), 0);
        }
        prop_assert!(conn.source().written().is_empty());
    }
}
