//! Reader/writer coordinator properties, exercised over the in-process
//! backend with real threads.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use chompchamps::core::board;
use chompchamps::{enter_read, enter_write, GameConfig, LocalSyncSegment, StateWriter};

/// Two readers prove they are inside the read section at the same time.
#[test]
fn readers_overlap() {
    let sync = LocalSyncSegment::new(1);
    let rendezvous = Arc::new(Barrier::new(2));

    let threads: Vec<_> = (0..2)
        .map(|_| {
            let sync = sync.clone();
            let rendezvous = Arc::clone(&rendezvous);
            thread::spawn(move || {
                let _read = enter_read(&sync).unwrap();
                // Deadlocks here if readers excluded each other.
                rendezvous.wait();
            })
        })
        .collect();

    for t in threads {
        t.join().unwrap();
    }
}

/// No reader ever observes a half-applied multi-field update, and writer
/// critical sections never interleave.
#[test]
fn writers_are_exclusive_and_updates_are_never_torn() {
    let config = GameConfig::new(10, 10, 1).unwrap();
    let state = Arc::new(StateWriter::create_in_memory(&config));
    board::initialize(&state, &config, 1);

    let sync = LocalSyncSegment::new(1);
    let writers_inside = Arc::new(AtomicU32::new(0));
    let stop = Arc::new(AtomicBool::new(false));

    // Two writer threads stand in for "writer sections never interleave";
    // the game itself has exactly one writer.
    let writers: Vec<_> = (0..2)
        .map(|w| {
            let state = Arc::clone(&state);
            let sync = sync.clone();
            let inside = Arc::clone(&writers_inside);
            thread::spawn(move || {
                for i in 0..500u32 {
                    let _write = enter_write(&sync).unwrap();
                    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0, "two writers inside");
                    let value = (w * 1000 + i) as i32 % 9 + 1;
                    state.set_cell(0, 0, value);
                    state.set_cell(9, 9, value);
                    assert_eq!(inside.fetch_sub(1, Ordering::SeqCst), 1);
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let state = Arc::clone(&state);
            let sync = sync.clone();
            let inside = Arc::clone(&writers_inside);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    let _read = enter_read(&sync).unwrap();
                    assert_eq!(inside.load(Ordering::SeqCst), 0, "reader overlapped a writer");
                    let a = state.cell(0, 0);
                    let b = state.cell(9, 9);
                    assert_eq!(a, b, "torn read");
                }
            })
        })
        .collect();

    for w in writers {
        w.join().unwrap();
    }
    stop.store(true, Ordering::SeqCst);
    for r in readers {
        r.join().unwrap();
    }
}

/// A writer makes progress while readers hammer the lock continuously:
/// the turnstile stops the reader stream from starving it. The test hangs
/// (and times out) if preference is broken badly.
#[test]
fn writer_is_not_starved_by_a_reader_stream() {
    let sync = LocalSyncSegment::new(1);
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let sync = sync.clone();
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    let _read = enter_read(&sync).unwrap();
                    std::hint::spin_loop();
                }
            })
        })
        .collect();

    // Let the reader stream saturate first.
    thread::sleep(Duration::from_millis(50));

    let writer = {
        let sync = sync.clone();
        thread::spawn(move || {
            for _ in 0..100 {
                let _write = enter_write(&sync).unwrap();
            }
        })
    };

    writer.join().unwrap();
    stop.store(true, Ordering::SeqCst);
    for r in readers {
        r.join().unwrap();
    }
}
