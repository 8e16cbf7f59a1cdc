//! End-to-end tests of the acquisition pipeline.
//!
//! A session is attached to one end of an in-memory pipe; the other end is
//! either driven by hand or by the simulated instrument. Everything between
//! (reader task, queue, ring buffer, scaling, statistics) is the real thing.

use serial_scope::acquisition::AcquisitionConfig;
use serial_scope::alc::{AlcField, AlcParameterRecord};
use serial_scope::config::ScopeConfig;
use serial_scope::serial::{ReaderState, SimulatedInstrument, SimulatorConfig};
use serial_scope::session::{ScopeEvent, ScopeSession, TickHandler};
use serial_scope::Frame;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::{sleep, timeout};

fn config_with(acquisition: AcquisitionConfig) -> ScopeConfig {
    ScopeConfig {
        acquisition,
        ..Default::default()
    }
}

/// Tick until a frame satisfies `done`, or fail after `limit`.
async fn tick_until(
    session: &mut ScopeSession,
    limit: Duration,
    mut done: impl FnMut(&Frame) -> bool,
) -> Frame {
    timeout(limit, async {
        loop {
            if let Some(ScopeEvent::Frame(frame)) = session.on_tick() {
                if done(&frame) {
                    return frame;
                }
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("no matching frame in time")
}

#[tokio::test]
async fn scripted_lines_reach_the_scope_in_order() {
    let acquisition = AcquisitionConfig {
        volts_per_count: 0.5,
        ..Default::default()
    };
    let mut session = ScopeSession::new(&config_with(acquisition)).unwrap();
    let (host, mut device) = tokio::io::duplex(1024);
    session.attach("pipe", Box::new(host)).unwrap();

    device
        .write_all(b"1000\r\nREADY\r\n\r\nx: -500, y: 250\r\n99999\r\n")
        .await
        .unwrap();

    let frame = tick_until(&mut session, Duration::from_secs(2), |f| f.sample_count >= 4).await;
    // Out-of-range tokens saturate at the 16-bit rail.
    assert_eq!(frame.samples, vec![500.0, -250.0, 125.0, 16383.5]);
    assert_eq!(frame.sample_count, 4);
    assert_eq!(frame.latest_volts, 16383.5);
    assert_eq!(frame.stats.max, 16383.5);
    assert_eq!(frame.stats.min, -250.0);

    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn paused_scope_keeps_queueing_until_resumed() {
    let mut session = ScopeSession::new(&ScopeConfig::default()).unwrap();
    let (host, mut device) = tokio::io::duplex(1024);
    session.attach("pipe", Box::new(host)).unwrap();
    session.scope_mut().set_paused(true);

    device.write_all(b"1\r\n2\r\n3\r\n").await.unwrap();
    timeout(Duration::from_secs(2), async {
        while session.scope().queue().len() < 3 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert!(session.on_tick().is_none());

    session.scope_mut().set_paused(false);
    match session.on_tick() {
        Some(ScopeEvent::Frame(frame)) => assert_eq!(frame.samples, vec![1.0, 2.0, 3.0]),
        other => panic!("expected a frame, got {other:?}"),
    }
    session.disconnect().await;
}

#[tokio::test]
async fn simulated_sine_statistics() {
    // 2000 Hz over 10 x 25 ms = 500 samples = 25 cycles of 100 Hz.
    let acquisition = AcquisitionConfig {
        sample_rate_hz: 2000.0,
        timebase_s_per_div: 0.025,
        ..Default::default()
    };
    let simulator = SimulatedInstrument::new(SimulatorConfig {
        sample_rate_hz: 2000.0,
        frequency_hz: 100.0,
        amplitude_counts: 10_000.0,
        noise_counts: 20,
        ..Default::default()
    });
    let mut session = ScopeSession::new(&config_with(acquisition)).unwrap();
    let (io, _device) = simulator.spawn();
    session.attach("simulator", io).unwrap();

    let frame = tick_until(&mut session, Duration::from_secs(5), |f| f.samples.len() >= 500).await;
    let stats = frame.stats;
    assert!((stats.vpp - 20_000.0).abs() < 200.0, "vpp {}", stats.vpp);
    assert!((stats.rms - 10_000.0 / 2f64.sqrt()).abs() < 300.0, "rms {}", stats.rms);
    let freq = stats.frequency_hz.expect("frequency estimate");
    assert!((freq - 100.0).abs() <= 20.0, "frequency {freq}");

    session.disconnect().await;
}

#[tokio::test]
async fn commands_interleave_with_streaming() {
    let simulator = SimulatedInstrument::new(SimulatorConfig {
        amplitude_counts: 1000.0,
        noise_counts: 10,
        ..Default::default()
    });
    let mut session = ScopeSession::new(&ScopeConfig::default()).unwrap();
    let (io, _device) = simulator.spawn();
    session.attach("simulator", io).unwrap();
    tick_until(&mut session, Duration::from_secs(2), |f| f.sample_count > 20).await;

    let channel = session.commands().unwrap();
    let record = AlcParameterRecord::defaults()
        .with_value(AlcField::Mode, 0)
        .with_value(AlcField::AttackTimeUs, 500)
        .with_value(AlcField::Group, 2);
    // Stream lines that arrived during the exchange are part of the response.
    assert!(channel.set(&record).await.unwrap().ends_with("OK"));
    assert_eq!(channel.get().await.unwrap(), record);
    assert_eq!(simulator.params(), record);

    // The reader resumes and keeps producing plausible samples.
    let before = session.scope().sample_count();
    let frame = tick_until(&mut session, Duration::from_secs(2), |f| f.sample_count > before + 50).await;
    assert_eq!(session.reader_state(), Some(ReaderState::Reading));

    // None of the response text was decoded as samples: +PARAM values such as
    // 32000 and 64000 would be far outside the simulated amplitude.
    let ring = session.scope().ring().ordered_view();
    assert!(ring.iter().all(|s| s.abs() <= 1010), "stray sample in {ring:?}");
    assert!(frame.stats.max <= 1010.0);

    session.disconnect().await;
}

#[tokio::test]
async fn device_disappearing_is_reported_once() {
    let mut session = ScopeSession::new(&ScopeConfig::default()).unwrap();
    let (host, mut device) = tokio::io::duplex(1024);
    session.attach("pipe", Box::new(host)).unwrap();
    device.write_all(b"7\r\n").await.unwrap();
    sleep(Duration::from_millis(50)).await;
    drop(device);

    let mut lost = 0;
    let mut frames = Vec::new();
    timeout(Duration::from_secs(2), async {
        while lost == 0 {
            match session.on_tick() {
                Some(ScopeEvent::ConnectionLost { .. }) => lost += 1,
                Some(ScopeEvent::Frame(frame)) => frames.push(frame),
                None => sleep(Duration::from_millis(5)).await,
            }
        }
    })
    .await
    .unwrap();
    for _ in 0..5 {
        if let Some(ScopeEvent::ConnectionLost { .. }) = session.on_tick() {
            lost += 1;
        }
    }

    assert_eq!(lost, 1);
    assert!(!session.is_connected());
    assert!(session.commands().is_err());
    // The sample read before the loss is not thrown away.
    let seen = frames.iter().any(|f| f.samples == vec![7.0]) || session.scope().latest() == Some(7);
    assert!(seen);
}

#[tokio::test]
async fn reconfiguring_while_connected_reallocates() {
    let mut session = ScopeSession::new(&ScopeConfig::default()).unwrap();
    let (host, mut device) = tokio::io::duplex(1024);
    session.attach("pipe", Box::new(host)).unwrap();
    device.write_all(b"1\r\n2\r\n").await.unwrap();
    tick_until(&mut session, Duration::from_secs(2), |f| f.sample_count == 2).await;

    let wider = AcquisitionConfig {
        timebase_s_per_div: 0.1,
        ..Default::default()
    };
    assert!(session.apply_acquisition(wider).unwrap());
    assert_eq!(session.scope().ring().capacity(), 1000);
    assert!(session.scope().ring().is_empty());

    // The reader keeps feeding the reallocated queue.
    device.write_all(b"3\r\n").await.unwrap();
    let frame = tick_until(&mut session, Duration::from_secs(2), |f| f.sample_count == 1).await;
    assert_eq!(frame.samples, vec![3.0]);
    session.disconnect().await;
}
