//! Live full-duplex passthrough demo.
//!
//! Captures the default microphone, runs the 48 kHz -> 16 kHz -> STFT ->
//! 48 kHz chain, and plays the result on the default output. The spectral
//! stage is the identity transform, so what you hear is your input with
//! the pipeline's latency.
//!
//! Run with: cargo run --example passthrough --features cpal-backend

use std::time::Duration;

use stft_duplex::device::cpal_backend;
use stft_duplex::DuplexPipeline;

/// Pipeline burst size: 6 ms at 48 kHz, divisible by 3.
const FRAMES_PER_BURST: usize = 288;
const RUN_SECONDS: u64 = 10;

fn main() {
    env_logger::init();

    let (capture, _capture_driver) =
        cpal_backend::open_default_capture(FRAMES_PER_BURST).expect("open capture device");
    let playback =
        cpal_backend::open_default_playback(FRAMES_PER_BURST).expect("open playback device");

    let mut pipeline = DuplexPipeline::new();
    pipeline.set_input_stream(Box::new(capture));
    pipeline.set_output_stream(Box::new(playback));
    pipeline.start().expect("start pipeline");

    println!(
        "Passthrough running for {}s (mic -> STFT -> speakers)...",
        RUN_SECONDS
    );
    for second in 1..=RUN_SECONDS {
        std::thread::sleep(Duration::from_secs(1));
        println!(
            "  t={:>2}s  overflows={}  underflows={}",
            second,
            pipeline.counters().overflows(),
            pipeline.counters().underflows()
        );
    }

    pipeline.stop();
    println!("Done.");
}
