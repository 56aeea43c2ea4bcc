//! Two-Peer Call with Keyframe Capture
//!
//! This example wires two peer controllers together over in-memory signaling
//! and a loopback transport, negotiates a call, then runs the keyframe
//! sampler over the remote stream while a scripted "conversation" plays:
//! a couple of loud moments and two scene changes.
//!
//! Run with: cargo run --example two_peer_call

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};

use peerlens::events::EventLog;
use peerlens::peer::{ConnectionState, PeerConnectionController};
use peerlens::sampler::{KeyframeSampler, SamplerConfig};
use peerlens::signaling::MemorySignaling;
use peerlens::testing::{synthetic_video_frame, uniform_frame, LoopbackTransport, ScriptStep, ScriptedMediaSource};
use peerlens::types::{KeyframeKind, VideoFrame, ANALYSIS_HEIGHT, ANALYSIS_WIDTH};
use peerlens::{CallEvent, MediaSource, PeerLensConfig};

const WAIT: Duration = Duration::from_secs(5);

/// Tick interval used by the demo script; the production default is 100 ms.
const TICK_MS: u64 = 50;

fn hold(steps: &mut Vec<ScriptStep>, ticks: usize, audio_level: f32, frame: &VideoFrame) {
    for _ in 0..ticks {
        steps.push(ScriptStep::Sample {
            audio_level,
            frame: frame.clone(),
        });
    }
}

/// Alice's camera and microphone as Bob will receive them: quiet stretches,
/// two bursts of speech, and two scene changes, about three seconds total.
fn alice_feed() -> Arc<ScriptedMediaSource> {
    let desk = uniform_frame(ANALYSIS_WIDTH, ANALYSIS_HEIGHT, 40);
    let whiteboard = synthetic_video_frame(60, ANALYSIS_WIDTH, ANALYSIS_HEIGHT);
    let window = synthetic_video_frame(150, ANALYSIS_WIDTH, ANALYSIS_HEIGHT);

    let mut steps = Vec::new();
    hold(&mut steps, 10, 20.0, &desk); //  0.0s-0.5s  quiet at the desk
    hold(&mut steps, 2, 190.0, &desk); //  0.5s       "hey, look at this!"
    hold(&mut steps, 12, 25.0, &desk); //  0.6s-1.2s  quiet again
    hold(&mut steps, 12, 25.0, &whiteboard); //  1.2s-1.8s  camera pans to the whiteboard
    hold(&mut steps, 3, 210.0, &whiteboard); //  1.8s       excited explanation
    hold(&mut steps, 8, 30.0, &whiteboard); //  2.0s-2.4s  quiet
    hold(&mut steps, 15, 20.0, &window); //  2.4s-3.1s  pans to the window, stays quiet

    Arc::new(ScriptedMediaSource::new(steps))
}

/// A quiet talking head, used for Bob's camera and for what Alice receives.
fn quiet_feed(value: u8) -> Arc<ScriptedMediaSource> {
    Arc::new(ScriptedMediaSource::from_levels(
        &[15.0],
        uniform_frame(ANALYSIS_WIDTH, ANALYSIS_HEIGHT, value),
    ))
}

fn watch_states(name: &'static str, controller: &PeerConnectionController) {
    let mut states = controller.state_stream();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            println!("   [{}] state -> {}", name, *states.borrow());
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    peerlens::init_logging();

    println!("📞 PeerLens Two-Peer Call Demo");
    println!("==============================");
    println!();

    // Step 1: Wire the pair
    println!("🔌 Step 1: Wire Signaling and Transport");
    println!("---------------------------------------");

    let config = PeerLensConfig::default();

    let (sig_alice, sig_bob) = MemorySignaling::pair("demo-session");
    let sig_alice = Arc::new(sig_alice);
    let sig_bob = Arc::new(sig_bob);

    // Alice receives Bob's quiet feed; Bob receives Alice's eventful one.
    let (tr_alice, tr_bob) = LoopbackTransport::pair_with_media(
        quiet_feed(90) as Arc<dyn MediaSource>,
        alice_feed() as Arc<dyn MediaSource>,
    );
    println!("   ✅ In-memory signaling link and loopback transport ready");

    // Step 2: Controllers
    println!();
    println!("🤝 Step 2: Create Peer Controllers");
    println!("----------------------------------");

    let alice = PeerConnectionController::new(
        "demo-session",
        "alice",
        tr_alice,
        sig_alice,
        Some(quiet_feed(40) as Arc<dyn MediaSource>),
        config.connection.clone(),
    );
    let bob = PeerConnectionController::new(
        "demo-session",
        "bob",
        tr_bob,
        sig_bob,
        Some(quiet_feed(50) as Arc<dyn MediaSource>),
        config.connection.clone(),
    );

    watch_states("alice", &alice);
    watch_states("bob", &bob);

    let mut bob_events = bob.subscribe();
    println!("   ✅ Controllers created for alice and bob");

    // Step 3: Negotiate
    println!();
    println!("📡 Step 3: Alice Calls Bob");
    println!("--------------------------");

    alice.start_call().await?;

    let mut alice_states = alice.state_stream();
    let mut bob_states = bob.state_stream();
    timeout(WAIT, alice_states.wait_for(|s| *s == ConnectionState::Connected)).await??;
    timeout(WAIT, bob_states.wait_for(|s| *s == ConnectionState::Connected)).await??;
    println!("   ✅ Both sides connected");

    let remote_stream = loop {
        match timeout(WAIT, bob_events.recv()).await?? {
            CallEvent::RemoteStream(stream) => break stream,
            other => log::debug!("waiting for remote stream, saw {:?}", other),
        }
    };
    println!("   ✅ Bob received Alice's remote stream");

    // Step 4: Sample the remote stream
    println!();
    println!("🎬 Step 4: Watch for Interesting Moments");
    println!("----------------------------------------");

    let sampler_config = SamplerConfig {
        tick_interval_ms: TICK_MS,
        video_interval_ms: 5 * TICK_MS,
        audio_cooldown_ms: 8 * TICK_MS,
        ..config.sampler.clone()
    };
    let log = Arc::new(EventLog::new());
    let sampler = KeyframeSampler::new(sampler_config, Arc::clone(&log));
    sampler.start(remote_stream)?;
    println!("   🔴 Sampling Alice's feed (~3 seconds of scripted call)...");

    sleep(Duration::from_millis(3500)).await;
    sampler.stop().await?;
    println!("   ⏹️  Sampler stopped");

    // Step 5: The captured timeline
    println!();
    println!("📸 Step 5: Captured Timeline");
    println!("----------------------------");

    let moments = log.all();
    if moments.is_empty() {
        println!("   (no keyframe moments captured)");
    }
    for moment in &moments {
        println!(
            "   {} moment at {:>5} ms ({} byte PNG snapshot)",
            moment.kind,
            moment.timestamp_ms,
            moment.snapshot.len()
        );
    }
    println!();
    println!(
        "   Total: {} moments ({} audio, {} video)",
        moments.len(),
        moments.iter().filter(|m| m.kind == KeyframeKind::Audio).count(),
        moments.iter().filter(|m| m.kind == KeyframeKind::Video).count(),
    );

    // Step 6: Hang up
    println!();
    println!("👋 Step 6: Hang Up");
    println!("------------------");

    alice.end().await?;
    bob.end().await?;
    log.clear();
    println!("   ✅ alice: {}", alice.state());
    println!("   ✅ bob: {}", bob.state());
    println!("   ✅ event log cleared ({} moments remain)", log.len());

    println!();
    println!("🎉 Two-Peer Call Demo Complete!");
    Ok(())
}
