//! ALC command exchanges against the simulated instrument.

use serial_scope::alc::{AlcField, AlcParameterRecord, CommandChannel, ProtocolTimeouts};
use serial_scope::config::ScopeConfig;
use serial_scope::error::ProtocolError;
use serial_scope::serial::{SerialLink, SimulatedInstrument, SimulatorConfig};
use serial_scope::session::{ScopeEvent, ScopeSession, TickHandler};
use serial_scope::ScopeError;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{sleep, timeout};

fn quiet_simulator() -> SimulatedInstrument {
    SimulatedInstrument::new(SimulatorConfig {
        streaming: false,
        ..Default::default()
    })
}

#[tokio::test]
async fn set_then_get_round_trips_through_the_device() {
    let simulator = quiet_simulator();
    let (io, _device) = simulator.spawn();
    let channel = CommandChannel::new(SerialLink::new("sim", io), ProtocolTimeouts::default());

    assert_eq!(channel.get().await.unwrap(), AlcParameterRecord::defaults());

    let record = AlcParameterRecord::defaults()
        .with_value(AlcField::Mode, 0)
        .with_value(AlcField::AttackTimeUs, 125)
        .with_value(AlcField::DecayTimeUs, 512_000)
        .with_value(AlcField::ApproxRateHz, 48_000);
    assert_eq!(channel.set(&record).await.unwrap(), "OK");
    assert_eq!(channel.get().await.unwrap(), record);
    assert_eq!(simulator.params(), record);
}

#[tokio::test]
async fn invalid_record_is_rejected_before_sending() {
    let simulator = quiet_simulator();
    let (io, _device) = simulator.spawn();
    let channel = CommandChannel::new(SerialLink::new("sim", io), ProtocolTimeouts::default());

    // Limiter mode caps attack at 32000.
    let record = AlcParameterRecord::defaults()
        .with_value(AlcField::AttackTimeUs, 64_000)
        .with_value(AlcField::ApproxRateHz, 100);
    match channel.set(&record).await {
        Err(ScopeError::Validation(report)) => {
            assert_eq!(report.len(), 2);
            assert!(report.mentions(AlcField::AttackTimeUs));
            assert!(report.mentions(AlcField::ApproxRateHz));
        }
        other => panic!("expected a validation error, got {other:?}"),
    }
    assert_eq!(simulator.params(), AlcParameterRecord::defaults());
}

#[tokio::test]
async fn silent_device_times_out_and_streaming_resumes() {
    let simulator = SimulatedInstrument::new(SimulatorConfig {
        respond_to_commands: false,
        ..Default::default()
    });
    let config = ScopeConfig {
        protocol: ProtocolTimeouts {
            get_timeout: Duration::from_millis(200),
            set_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(20),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut session = ScopeSession::new(&config).unwrap();
    let (io, _device) = simulator.spawn();
    session.attach("sim", io).unwrap();

    let err = session.commands().unwrap().get().await.unwrap_err();
    assert!(err.is_retryable(), "unexpected error: {err}");
    match &err {
        ScopeError::Timeout { command, partial, .. } => {
            assert_eq!(command, "AT+PARAM?");
            // Stream lines kept arriving while we waited.
            assert!(!partial.is_empty());
        }
        other => panic!("expected a timeout, got {other}"),
    }

    // Streaming carries on after the failed exchange.
    let before = session.scope().sample_count();
    let advanced = timeout(Duration::from_secs(2), async {
        loop {
            if let Some(ScopeEvent::Frame(frame)) = session.on_tick() {
                if frame.sample_count > before + 20 {
                    return;
                }
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(advanced.is_ok());
    session.disconnect().await;
}

#[tokio::test]
async fn short_parameter_line_is_a_protocol_error() {
    let (host, mut device) = tokio::io::duplex(1024);
    let channel = CommandChannel::new(SerialLink::new("pipe", Box::new(host)), ProtocolTimeouts::default());

    let responder = tokio::spawn(async move {
        let mut buf = [0u8; 64];
        let n = device.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"AT+PARAM?\r\n");
        let fields = vec!["1"; 24].join(",");
        device
            .write_all(format!("+PARAM:ALC,{fields}\r\nOK\r\n").as_bytes())
            .await
            .unwrap();
        device
    });

    let err = channel.get().await.unwrap_err();
    assert!(matches!(
        err,
        ScopeError::Protocol(ProtocolError::FieldCount { expected: 25, actual: 24, .. })
    ));
    assert!(!err.is_retryable());
    drop(responder.await.unwrap());
}

#[tokio::test]
async fn device_error_is_reported_verbatim() {
    let (host, mut device) = tokio::io::duplex(1024);
    let channel = CommandChannel::new(SerialLink::new("pipe", Box::new(host)), ProtocolTimeouts::default());

    let responder = tokio::spawn(async move {
        let mut buf = [0u8; 256];
        let _ = device.read(&mut buf).await.unwrap();
        device.write_all(b"+CME: busy\r\nERROR\r\n").await.unwrap();
        device
    });

    match channel.set(&AlcParameterRecord::defaults()).await {
        Err(ScopeError::DeviceRejected { response }) => assert_eq!(response, "+CME: busy\r\nERROR"),
        other => panic!("expected a rejection, got {other:?}"),
    }
    drop(responder.await.unwrap());
}
