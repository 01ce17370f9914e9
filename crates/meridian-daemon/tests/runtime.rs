//! End-to-end runtime test: a toy covers daemon over a Unix socket.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use async_trait::async_trait;

use meridian_core::config::ObservatoryConfig;
use meridian_core::DaemonRegistry;
use meridian_daemon::{
    CommandValidator, ControlProgram, DaemonClient, DaemonError, DaemonRuntime, ProgramTick,
    Validated,
};
use meridian_proto::{
    CoverPosition, CoversInfo, CoversUnitInfo, DaemonId, DaemonStatus, Request, RpcError,
    StatusSnapshot, SubsystemInfo,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TestCommand {
    Open,
    Close,
}

struct TestProgram {
    position: CoverPosition,
}

#[async_trait]
impl ControlProgram for TestProgram {
    type Command = TestCommand;

    fn daemon_id(&self) -> DaemonId {
        DaemonId::Covers
    }

    async fn refresh(&mut self) -> ProgramTick {
        ProgramTick {
            info: SubsystemInfo::Covers(CoversInfo {
                units: vec![CoversUnitInfo {
                    unit: 1,
                    position: self.position,
                    moving: false,
                }],
            }),
            bad_units: Vec::new(),
        }
    }

    async fn execute(&mut self, command: TestCommand) {
        self.position = match command {
            TestCommand::Open => CoverPosition::Open,
            TestCommand::Close => CoverPosition::Closed,
        };
    }
}

struct TestValidator;

impl CommandValidator for TestValidator {
    type Command = TestCommand;

    fn validate(
        &self,
        request: &Request,
        _latest: Option<&StatusSnapshot>,
    ) -> Result<Validated<TestCommand>, RpcError> {
        match request {
            Request::OpenCovers { .. } => Ok(Validated::Queue {
                command: TestCommand::Open,
                ack: "opening covers".into(),
            }),
            Request::CloseCovers { .. } => Ok(Validated::Queue {
                command: TestCommand::Close,
                ack: "closing covers".into(),
            }),
            _ => Err(RpcError::UnsupportedCommand {
                daemon: DaemonId::Covers,
            }),
        }
    }
}

fn test_config(run_dir: &std::path::Path) -> ObservatoryConfig {
    let mut config = ObservatoryConfig::default();
    config.run_dir = run_dir.to_path_buf();
    config.daemon.loop_interval = Duration::from_millis(50);
    config
}

fn position_of(snapshot: &StatusSnapshot) -> CoverPosition {
    match &snapshot.payload {
        SubsystemInfo::Covers(info) => info.units[0].position,
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn daemon_serves_commands_and_shuts_down() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let registry = DaemonRegistry::from_config(&config);

    let runtime = DaemonRuntime::new(
        TestProgram {
            position: CoverPosition::Open,
        },
        TestValidator,
        &registry,
        &config,
    )
    .unwrap();
    let daemon = tokio::spawn(runtime.run());

    let client = DaemonClient::from_registry(&registry, DaemonId::Covers, &config.rpc).unwrap();

    // Wait for the daemon to come up.
    let mut up = false;
    for _ in 0..100 {
        if client.get_info(false).await.is_ok() {
            up = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(up, "daemon did not come up within 5s");

    // Pidfile written, loop healthy, hardware visible.
    assert!(dir.path().join("covers.pid").exists());
    assert_eq!(client.get_status().await.unwrap(), DaemonStatus::Running);
    let snapshot = client.get_info(false).await.unwrap();
    assert_eq!(position_of(&snapshot), CoverPosition::Open);

    // Queue a command; its effect shows up in a later snapshot.
    let ack = client
        .command(Request::CloseCovers { units: vec![1] })
        .await
        .unwrap();
    assert_eq!(ack, "closing covers");
    let mut closed = false;
    for _ in 0..100 {
        let snapshot = client.get_info(false).await.unwrap();
        if position_of(&snapshot) == CoverPosition::Closed {
            closed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(closed, "covers never closed");

    // A command the subsystem does not speak is refused with the typed error.
    match client
        .command(Request::MoveFocusers { offsets: vec![] })
        .await
    {
        Err(DaemonError::Rpc(RpcError::UnsupportedCommand { daemon })) => {
            assert_eq!(daemon, DaemonId::Covers);
        }
        other => panic!("expected UnsupportedCommand, got {other:?}"),
    }

    // Forced info returns a snapshot newer than the request.
    let before = meridian_proto::current_timestamp_ns();
    let forced = client.get_info(true).await.unwrap();
    assert!(forced.time_ns > before);

    // Graceful shutdown removes the pidfile.
    client.shutdown().await.unwrap();
    daemon.await.unwrap().unwrap();
    assert!(!dir.path().join("covers.pid").exists());
}
