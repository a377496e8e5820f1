//! Soak runner for the loopmix engine
//!
//! Drives a mixer the way a host would, with no audio hardware involved:
//! a render thread paced by the period length, one producer thread per node
//! source pushing timestamped tones in uneven chunks, and a continuous
//! submitter on slot 0. The main thread drains the render log into
//! `env_logger` and prints a status table once a second.
//!
//! ## Command line flags
//!
//! - `--seconds N`: run time (default 10)
//! - `--nodes N`: node sources to register, 0-7 (default 3)
//! - `--config PATH`: mixer config file (default: platform config dir)
//! - `--save-config`: write the effective config back and exit

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use loopmix_core::config::{default_config_path, load_mixer_config, save_config, CONFIG_FILE_NAME};
use loopmix_core::{global, status_code, LatencyProbe, Mixer, OutputBuffer, CHANNELS, MAX_SOURCES, STATUS_OK};

/// Samples the render tap can hold before the render thread starts skipping
const TAP_CAPACITY: usize = 1 << 16;

struct SoakOptions {
    seconds: u64,
    nodes: usize,
    config_path: PathBuf,
    save_config: bool,
}

impl SoakOptions {
    fn from_args() -> Result<Self> {
        let mut options = Self {
            seconds: 10,
            nodes: 3,
            config_path: default_config_path(CONFIG_FILE_NAME),
            save_config: false,
        };

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--seconds" => {
                    let value = args.next().context("--seconds needs a value")?;
                    options.seconds = value
                        .parse()
                        .with_context(|| format!("Invalid --seconds value: {}", value))?;
                }
                "--nodes" => {
                    let value = args.next().context("--nodes needs a value")?;
                    options.nodes = value
                        .parse()
                        .with_context(|| format!("Invalid --nodes value: {}", value))?;
                    if options.nodes >= MAX_SOURCES {
                        bail!("--nodes must be below {}", MAX_SOURCES);
                    }
                }
                "--config" => {
                    options.config_path = args.next().context("--config needs a path")?.into();
                }
                "--save-config" => options.save_config = true,
                other => bail!("Unknown argument: {}", other),
            }
        }
        Ok(options)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let options = SoakOptions::from_args()?;
    let config = load_mixer_config(&options.config_path);

    if options.save_config {
        save_config(&config, &options.config_path)?;
        println!("Config written to {:?}", options.config_path);
        return Ok(());
    }

    let mixer = Arc::new(Mixer::with_config(config)?);
    global::install(Arc::clone(&mixer));

    for index in 1..=options.nodes {
        if !global::register_default_node_source(index) {
            bail!("Failed to register node source {}", index);
        }
    }

    log::info!(
        "loopmix-soak: {} s, {} node sources, {:.0} Hz, {} frames per period",
        options.seconds,
        options.nodes,
        mixer.sample_rate(),
        mixer.buffer_frames()
    );

    let running = Arc::new(AtomicBool::new(true));
    let render_failures = Arc::new(AtomicU64::new(0));
    let period = Duration::from_secs_f64(mixer.buffer_frames() as f64 / mixer.sample_rate());
    let (mut tap_tx, mut tap_rx) = rtrb::RingBuffer::<f32>::new(TAP_CAPACITY);

    let mut workers = Vec::new();

    // Render thread, paced like a hardware callback
    workers.push({
        let mixer = Arc::clone(&mixer);
        let running = Arc::clone(&running);
        let failures = Arc::clone(&render_failures);
        thread::Builder::new()
            .name("loopmix-render".to_string())
            .spawn(move || {
                let frames = mixer.buffer_frames();
                let mut out = vec![0.0f32; frames * CHANNELS];
                let mut next = Instant::now();
                while running.load(Ordering::Relaxed) {
                    let result = mixer.process(
                        Some(OutputBuffer::stereo(&mut out)),
                        frames,
                        Some(loopmix_core::monotonic_timestamp_ns()),
                    );
                    if status_code(&result) != STATUS_OK {
                        failures.fetch_add(1, Ordering::Relaxed);
                    }
                    for &sample in &out {
                        if tap_tx.push(sample).is_err() {
                            break;
                        }
                    }
                    next += period;
                    thread::sleep(next.saturating_duration_since(Instant::now()));
                }
            })?
    });

    // One producer per node, pushing uneven chunks around the period length
    for index in 1..=options.nodes {
        let mixer = Arc::clone(&mixer);
        let running = Arc::clone(&running);
        workers.push(
            thread::Builder::new()
                .name(format!("loopmix-node-{}", index))
                .spawn(move || {
                    let probe = LatencyProbe::new(mixer.sample_rate(), 0);
                    let tone = 220.0 * index as f32;
                    let base = mixer.buffer_frames();
                    let mut position = 0u64;
                    let mut chunk = vec![0.0f32; base * 2 * CHANNELS];
                    let mut step = 0usize;
                    while running.load(Ordering::Relaxed) {
                        let frames = (base / 2 + (step * 37 + index * 11) % base).max(1);
                        let data = &mut chunk[..frames * CHANNELS];
                        probe.emit_sine(tone, position, data);
                        global::push_node_frames(index, data, loopmix_core::monotonic_timestamp_ns());
                        position += frames as u64;
                        step += 1;
                        thread::sleep(Duration::from_secs_f64(frames as f64 / mixer.sample_rate()));
                    }
                })?,
        );
    }

    // Continuous source on slot 0
    workers.push({
        let mixer = Arc::clone(&mixer);
        let running = Arc::clone(&running);
        thread::Builder::new()
            .name("loopmix-continuous".to_string())
            .spawn(move || {
                let probe = LatencyProbe::new(mixer.sample_rate(), 0);
                let frames = mixer.buffer_frames();
                let mut block = vec![0.0f32; frames * CHANNELS];
                let mut position = 0u64;
                while running.load(Ordering::Relaxed) {
                    probe.emit_sine(110.0, position, &mut block);
                    if let Err(e) = mixer.submit_input(&block) {
                        log::error!("Continuous submit failed: {}", e);
                    }
                    position += frames as u64;
                    thread::sleep(period);
                }
            })?
    });

    mixer.set_gain_db(-12.0);
    let started = Instant::now();
    let deadline = Duration::from_secs(options.seconds);
    while started.elapsed() < deadline {
        thread::sleep(Duration::from_secs(1));

        let mut peak = 0.0f32;
        while let Ok(sample) = tap_rx.pop() {
            peak = peak.max(sample.abs());
        }

        mixer.drain_logs();
        if let Some(status) = global::status() {
            println!("[{:>3}s] output peak {:.3}", started.elapsed().as_secs(), peak);
            print!("{}", status);
        }
    }

    running.store(false, Ordering::Relaxed);
    for worker in workers {
        if worker.join().is_err() {
            log::error!("A soak worker thread panicked");
        }
    }

    mixer.drain_logs();
    global::uninstall_if(&mixer);

    let failures = render_failures.load(Ordering::Relaxed);
    println!(
        "Soak finished: {} render failures, {} dropped log lines",
        failures,
        mixer.dropped_log_lines()
    );
    if failures > 0 {
        bail!("{} render calls failed", failures);
    }
    Ok(())
}
