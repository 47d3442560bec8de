//! Scheduler behavior over the in-process backend: agents are threads,
//! channels are real pipes, the scheduler is the same code that runs the
//! multi-process game.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chompchamps::agent::{self, GreedyPlus, Strategy};
use chompchamps::core::board;
use chompchamps::engine::{FinishReason, RunSummary, Scheduler, SchedulerConfig};
use chompchamps::{
    enter_read, enter_write, move_channel, Direction, GameConfig, GameSnapshot, LocalSyncSegment,
    MoveReceiver, StateWriter, SyncAccess,
};

fn fast_config(timeout_ms: u64) -> SchedulerConfig {
    SchedulerConfig {
        inactivity_timeout: Duration::from_millis(timeout_ms),
        drain_grace: Duration::from_millis(500),
        tick_delay: Duration::ZERO,
    }
}

/// Keeps walking one compass direction; never gives up its channel until
/// blocked.
struct FixedDirection(Direction);

impl Strategy for FixedDirection {
    fn pick_move(&mut self, snapshot: &GameSnapshot, me: usize) -> Option<Direction> {
        if snapshot.agents[me].blocked {
            None
        } else {
            Some(self.0)
        }
    }
}

/// Declines immediately: the agent closes its channel on its first turn.
struct Decline;

impl Strategy for Decline {
    fn pick_move(&mut self, _snapshot: &GameSnapshot, _me: usize) -> Option<Direction> {
        None
    }
}

struct Harness {
    state: StateWriter,
    sync: LocalSyncSegment,
    receivers: Vec<MoveReceiver>,
    threads: Vec<JoinHandle<()>>,
    initial: GameSnapshot,
}

/// Stand up a full game with one thread per agent running the real agent
/// runtime loop.
fn spawn_game(
    config: &GameConfig,
    seed: u64,
    strategies: Vec<Box<dyn Strategy + Send>>,
) -> Harness {
    let state = StateWriter::create_in_memory(config);
    board::initialize(&state, config, seed);
    let sync = LocalSyncSegment::new(config.agent_count());

    let mut receivers = Vec::new();
    let mut threads = Vec::new();
    for (index, mut strategy) in strategies.into_iter().enumerate() {
        {
            let _write = enter_write(&sync).unwrap();
            state.set_agent_identity(index, &format!("agent{index}"), 1000 + index as i32);
        }
        let (receiver, sender) = move_channel().unwrap();
        receivers.push(receiver);

        let reader = state.reader().unwrap();
        let sync = sync.clone();
        threads.push(thread::spawn(move || {
            agent::run(&reader, &sync, index, sender, strategy.as_mut()).unwrap();
        }));
    }

    let initial = state.snapshot();
    Harness {
        state,
        sync,
        receivers,
        threads,
        initial,
    }
}

fn run_harness(
    harness: Harness,
    config: SchedulerConfig,
) -> (RunSummary, GameSnapshot, GameSnapshot) {
    let Harness {
        state,
        sync,
        receivers,
        threads,
        initial,
    } = harness;

    let stop = Arc::new(AtomicBool::new(false));
    let summary = Scheduler::new(&state, &sync, receivers, config, false, stop)
        .run()
        .unwrap();
    for thread in threads {
        thread.join().unwrap();
    }
    let final_snapshot = state.snapshot();
    (summary, initial, final_snapshot)
}

/// Scenario A: two north-walkers on seed 42 end at deterministic
/// positions with deterministic scores.
#[test]
fn scenario_a_north_walkers_are_deterministic() {
    let run = || {
        let config = GameConfig::new(10, 10, 2).unwrap();
        let strategies: Vec<Box<dyn Strategy + Send>> = vec![
            Box::new(FixedDirection(Direction::North)),
            Box::new(FixedDirection(Direction::North)),
        ];
        run_harness(spawn_game(&config, 42, strategies), fast_config(400))
    };

    let (summary_a, initial, final_a) = run();
    let (_, _, final_b) = run();

    assert!(final_a.finished);
    assert_eq!(summary_a.reason, FinishReason::InactivityTimeout);

    for i in 0..2 {
        // Identical across runs.
        assert_eq!(final_a.agents[i].score, final_b.agents[i].score);
        assert_eq!(
            (final_a.agents[i].x, final_a.agents[i].y),
            (final_b.agents[i].x, final_b.agents[i].y)
        );

        // A north walker climbs its own column to the top and collects
        // exactly that column's rewards.
        let (start_x, start_y) = (initial.agents[i].x, initial.agents[i].y);
        assert_eq!((final_a.agents[i].x, final_a.agents[i].y), (start_x, 0));
        let expected: u32 = (0..start_y).map(|y| initial.cell(start_x, y) as u32).sum();
        assert_eq!(final_a.agents[i].score, expected);
        assert_eq!(final_a.agents[i].valid_moves, u32::from(start_y));
    }
}

/// Scenario B: an agent that closes its channel immediately is blocked;
/// the rest of the game continues without it.
#[test]
fn scenario_b_immediate_close_blocks_only_that_agent() {
    let config = GameConfig::new(10, 10, 2).unwrap();
    let strategies: Vec<Box<dyn Strategy + Send>> =
        vec![Box::new(Decline), Box::new(GreedyPlus::new())];
    let (summary, _, final_snapshot) =
        run_harness(spawn_game(&config, 7, strategies), fast_config(3000));

    assert_eq!(summary.reason, FinishReason::AllBlocked);
    assert!(final_snapshot.finished);

    assert!(final_snapshot.agents[0].blocked);
    assert_eq!(final_snapshot.agents[0].valid_moves, 0);
    assert_eq!(final_snapshot.agents[0].score, 0);

    assert!(final_snapshot.agents[1].valid_moves > 0);
    assert!(final_snapshot.agents[1].score > 0);
}

/// Scenario C: a flood of invalid requests never resets the inactivity
/// timer; the run ends by timeout with all scores at zero.
#[test]
fn scenario_c_invalid_flood_times_out_with_zero_scores() {
    let config = GameConfig::new(10, 10, 2).unwrap();
    let state = StateWriter::create_in_memory(&config);
    board::initialize(&state, &config, 9);
    let sync = LocalSyncSegment::new(2);

    let mut receivers = Vec::new();
    let mut threads = Vec::new();
    for index in 0..2 {
        {
            let _write = enter_write(&sync).unwrap();
            state.set_agent_identity(index, &format!("spam{index}"), 2000 + index as i32);
        }
        let (receiver, mut sender) = move_channel().unwrap();
        receivers.push(receiver);

        let reader = state.reader().unwrap();
        let sync = sync.clone();
        threads.push(thread::spawn(move || loop {
            {
                let _read = enter_read(&sync).unwrap();
                if reader.finished() {
                    break;
                }
            }
            sync.wait_turn(index).unwrap();
            {
                let _read = enter_read(&sync).unwrap();
                if reader.finished() {
                    break;
                }
            }
            // Out-of-range on the wire, on purpose.
            if sender.send_raw(42).is_err() {
                break;
            }
        }));
    }

    let started = Instant::now();
    let stop = Arc::new(AtomicBool::new(false));
    let summary = Scheduler::new(&state, &sync, receivers, fast_config(300), false, stop)
        .run()
        .unwrap();
    let elapsed = started.elapsed();
    for thread in threads {
        thread.join().unwrap();
    }

    assert_eq!(summary.reason, FinishReason::InactivityTimeout);
    assert!(elapsed >= Duration::from_millis(300));
    assert_eq!(summary.valid_moves, 0);
    assert!(summary.invalid_moves > 0);

    let final_snapshot = state.snapshot();
    assert!(final_snapshot.finished);
    for agent in &final_snapshot.agents {
        assert_eq!(agent.score, 0);
        assert!(agent.invalid_moves > 0);
        assert!(!agent.blocked);
    }
}

/// Scenario D: a responsive-but-silent agent lets the timeout fire; the
/// orchestrator finishes, wakes the agent, and drains within the grace
/// period.
#[test]
fn scenario_d_silent_agent_times_out_and_drains() {
    let config = GameConfig::new(10, 10, 1).unwrap();
    let state = StateWriter::create_in_memory(&config);
    board::initialize(&state, &config, 4);
    let sync = LocalSyncSegment::new(1);
    {
        let _write = enter_write(&sync).unwrap();
        state.set_agent_identity(0, "mute", 3000);
    }

    let (receiver, sender) = move_channel().unwrap();
    let reader = state.reader().unwrap();
    let agent_sync = sync.clone();
    let agent_thread = thread::spawn(move || {
        // Holds the channel open, never sends, exits on the final grant.
        let sender = sender;
        loop {
            {
                let _read = enter_read(&agent_sync).unwrap();
                if reader.finished() {
                    break;
                }
            }
            agent_sync.wait_turn(0).unwrap();
        }
        drop(sender);
    });

    let started = Instant::now();
    let stop = Arc::new(AtomicBool::new(false));
    let summary = Scheduler::new(&state, &sync, vec![receiver], fast_config(250), false, stop)
        .run()
        .unwrap();
    let elapsed = started.elapsed();
    agent_thread.join().unwrap();

    assert_eq!(summary.reason, FinishReason::InactivityTimeout);
    assert!(state.finished());
    assert_eq!(summary.valid_moves, 0);
    // Timeout, final handshake, and drain all fit inside the configured
    // windows with generous slack.
    assert!(elapsed < Duration::from_millis(250 + 500 + 1000));
}

/// With every channel simultaneously ready the whole run, servicing is a
/// strict round-robin rotation: nobody is serviced twice before everyone
/// ready is serviced once.
#[test]
fn fairness_is_strict_rotation_when_all_agents_stay_ready() {
    let config = GameConfig::new(10, 10, 3).unwrap();
    let state = StateWriter::create_in_memory(&config);
    board::initialize(&state, &config, 3);
    let sync = LocalSyncSegment::new(3);

    let mut receivers = Vec::new();
    for index in 0..3 {
        {
            let _write = enter_write(&sync).unwrap();
            state.set_agent_identity(index, &format!("pre{index}"), 4000 + index as i32);
        }
        let (receiver, mut sender) = move_channel().unwrap();
        // Queue requests up front so readiness never depends on thread
        // timing, then close: the 21st read is the EOF.
        for _ in 0..20 {
            sender.send_raw(200).unwrap();
        }
        drop(sender);
        receivers.push(receiver);
    }

    let stop = Arc::new(AtomicBool::new(false));
    let summary = Scheduler::new(&state, &sync, receivers, fast_config(2000), false, stop)
        .run()
        .unwrap();

    assert_eq!(summary.reason, FinishReason::AllBlocked);
    assert_eq!(summary.service_trace.len(), 63);
    for (k, &agent) in summary.service_trace.iter().enumerate() {
        assert_eq!(agent as usize, k % 3, "rotation broke at event {k}");
    }
    for window in summary.service_trace.windows(3) {
        let mut seen = [false; 3];
        for &agent in window {
            assert!(!seen[agent as usize], "agent serviced twice in a window");
            seen[agent as usize] = true;
        }
    }
}

/// Sum of scores equals the sum of the original rewards of every cell the
/// agents claimed, whatever the interleaving.
#[test]
fn conservation_of_claimed_rewards() {
    for seed in [1u64, 7, 42] {
        let config = GameConfig::new(10, 10, 3).unwrap();
        let strategies: Vec<Box<dyn Strategy + Send>> = (0..3)
            .map(|_| Box::new(GreedyPlus::new()) as Box<dyn Strategy + Send>)
            .collect();
        let (summary, initial, final_snapshot) =
            run_harness(spawn_game(&config, seed, strategies), fast_config(3000));

        assert_eq!(summary.reason, FinishReason::AllBlocked);

        let total_score: u32 = final_snapshot.agents.iter().map(|a| a.score).sum();
        let mut claimed_rewards = 0u32;
        for y in 0..10u16 {
            for x in 0..10u16 {
                if final_snapshot.cell(x, y) <= 0 && initial.cell(x, y) > 0 {
                    claimed_rewards += initial.cell(x, y) as u32;
                }
            }
        }
        assert_eq!(total_score, claimed_rewards, "seed {seed}");

        assert_eq!(
            summary.valid_moves,
            final_snapshot.agents.iter().map(|a| a.valid_moves).sum::<u32>()
        );

        // Post-game cell invariant.
        for y in 0..10u16 {
            for x in 0..10u16 {
                let v = final_snapshot.cell(x, y);
                assert!((1..=9).contains(&v) || (-2..=0).contains(&v));
            }
        }
    }
}
