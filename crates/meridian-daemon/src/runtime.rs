//! The daemon runtime: control loop plus RPC server.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use tokio::sync::{watch, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use meridian_core::config::ObservatoryConfig;
use meridian_core::{Connection, DaemonRegistry, DaemonSpec, Listener};
use meridian_proto::{
    current_timestamp_ns, DaemonId, Envelope, Request, Response, RpcError, StatusSnapshot, UnitId,
};

use crate::client::DaemonClient;
use crate::command::CommandSlot;
use crate::deps::DependencyTracker;
use crate::error::{DaemonError, Result};
use crate::pidfile::Pidfile;
use crate::program::{CommandValidator, ControlProgram, Validated};
use crate::status::compute_status;
use crate::wire::{read_request, write_response};

/// Loop health observed by the RPC side.
#[derive(Debug)]
struct Health {
    bad_dependencies: Vec<DaemonId>,
    bad_units: Vec<UnitId>,
    last_tick: Instant,
}

/// State shared between the control loop and connection tasks.
struct Shared<C> {
    slot: CommandSlot<C>,
    snapshot: watch::Sender<Option<StatusSnapshot>>,
    health: StdMutex<Health>,
    force_tick: Notify,
    shutdown: Notify,
    liveness_window: Duration,
    force_timeout: Duration,
}

impl<C> Shared<C> {
    fn health(&self) -> std::sync::MutexGuard<'_, Health> {
        match self.health.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// One daemon process: a control-loop task plus an RPC listener.
pub struct DaemonRuntime<P, V>
where
    P: ControlProgram,
    V: CommandValidator<Command = P::Command>,
{
    program: P,
    validator: Arc<V>,
    spec: DaemonSpec,
    deps: DependencyTracker,
    loop_interval: Duration,
    liveness_window: Duration,
    force_timeout: Duration,
}

impl<P, V> DaemonRuntime<P, V>
where
    P: ControlProgram,
    V: CommandValidator<Command = P::Command>,
{
    /// Wires a program and its validator to the registry entry for the
    /// program's daemon identity.
    pub fn new(
        program: P,
        validator: V,
        registry: &DaemonRegistry,
        config: &ObservatoryConfig,
    ) -> Result<Self> {
        let daemon = program.daemon_id();
        let spec = registry
            .get(daemon)
            .ok_or(DaemonError::Unregistered { daemon })?;
        let clients = spec
            .dependencies
            .iter()
            .map(|dep| DaemonClient::from_registry(registry, *dep, &config.rpc))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            program,
            validator: Arc::new(validator),
            spec,
            deps: DependencyTracker::new(clients, config.daemon.dependency_grace),
            loop_interval: config.daemon.loop_interval,
            liveness_window: config.daemon.liveness_window,
            force_timeout: config.rpc.force_update_timeout,
        })
    }

    /// Runs until a shutdown request arrives.
    ///
    /// Writes the pidfile, binds the endpoint, serves RPC concurrently and
    /// ticks the control loop. The pidfile disappears on return.
    pub async fn run(mut self) -> Result<()> {
        let daemon = self.spec.id;
        let pidfile = Pidfile::write(&self.spec.pidfile)?;
        let listener = self.spec.transport.bind().await?;
        info!(%daemon, endpoint = %self.spec.transport, "daemon listening");

        let shared = Arc::new(Shared {
            slot: CommandSlot::new(),
            snapshot: watch::channel(None).0,
            health: StdMutex::new(Health {
                bad_dependencies: Vec::new(),
                bad_units: Vec::new(),
                last_tick: Instant::now(),
            }),
            force_tick: Notify::new(),
            shutdown: Notify::new(),
            liveness_window: self.liveness_window,
            force_timeout: self.force_timeout,
        });

        let accept = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&shared),
            Arc::clone(&self.validator),
        ));

        let started = Instant::now();
        let mut interval = tokio::time::interval(self.loop_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shared.force_tick.notified() => {}
                _ = shared.shutdown.notified() => break,
            }

            let bad_dependencies = self.deps.check().await;
            let tick = self.program.refresh().await;

            {
                let mut health = shared.health();
                health.bad_dependencies = bad_dependencies;
                health.bad_units = tick.bad_units;
                health.last_tick = Instant::now();
            }

            // Snapshot times never regress, even if the wall clock does.
            let mut time_ns = current_timestamp_ns();
            if let Some(prev) = shared.snapshot.borrow().as_ref() {
                if time_ns <= prev.time_ns {
                    time_ns = prev.time_ns + 1;
                }
            }
            shared.snapshot.send_replace(Some(StatusSnapshot {
                daemon_id: daemon,
                time_ns,
                uptime_secs: started.elapsed().as_secs(),
                payload: tick.info,
            }));

            if let Some(command) = shared.slot.take() {
                debug!(%daemon, ?command, "executing command");
                self.program.execute(command).await;
            }
        }

        info!(%daemon, "daemon shutting down");
        accept.abort();
        drop(pidfile);
        Ok(())
    }
}

async fn accept_loop<V: CommandValidator>(
    listener: Box<dyn Listener>,
    shared: Arc<Shared<V::Command>>,
    validator: Arc<V>,
) {
    loop {
        match listener.accept().await {
            Ok(conn) => {
                tokio::spawn(serve_connection(
                    conn,
                    Arc::clone(&shared),
                    Arc::clone(&validator),
                ));
            }
            Err(e) => {
                error!(error = %e, "accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn serve_connection<V: CommandValidator>(
    mut conn: Box<dyn Connection>,
    shared: Arc<Shared<V::Command>>,
    validator: Arc<V>,
) {
    // One task per connection; the client may pipeline requests on it.
    loop {
        let envelope = match read_request(&mut conn).await {
            Ok(envelope) => envelope,
            Err(_) => return, // closed or garbage; either way drop the connection
        };
        let response = handle_request(envelope.payload, &shared, validator.as_ref()).await;
        let reply = Envelope::response_to(&envelope.header, response);
        if write_response(&mut conn, &reply).await.is_err() {
            return;
        }
    }
}

async fn handle_request<V: CommandValidator>(
    request: Request,
    shared: &Shared<V::Command>,
    validator: &V,
) -> Response {
    match request {
        Request::GetStatus => {
            let (bad_dependencies, bad_units, tick_age) = {
                let health = shared.health();
                (
                    health.bad_dependencies.clone(),
                    health.bad_units.clone(),
                    health.last_tick.elapsed(),
                )
            };
            Response::Status(compute_status(
                &bad_dependencies,
                &bad_units,
                tick_age,
                shared.liveness_window,
            ))
        }

        Request::GetInfo { force_update } => {
            if force_update {
                let asked = current_timestamp_ns();
                shared.force_tick.notify_one();
                match wait_for_snapshot(shared, Some(asked)).await {
                    Some(snapshot) => Response::Info(snapshot),
                    None => Response::Error(RpcError::Internal(
                        "no fresh snapshot within timeout".into(),
                    )),
                }
            } else {
                let latest = shared.snapshot.borrow().clone();
                match latest {
                    Some(snapshot) => Response::Info(snapshot),
                    // First tick hasn't happened yet; wait for it.
                    None => match wait_for_snapshot(shared, None).await {
                        Some(snapshot) => Response::Info(snapshot),
                        None => Response::Error(RpcError::Internal(
                            "no snapshot within timeout".into(),
                        )),
                    },
                }
            }
        }

        Request::Shutdown => {
            shared.shutdown.notify_one();
            Response::Ack("shutting down".into())
        }

        Request::Prod => {
            shared.force_tick.notify_one();
            Response::Ack("control loop prodded".into())
        }

        other => {
            let latest = shared.snapshot.borrow().clone();
            match validator.validate(&other, latest.as_ref()) {
                Ok(Validated::Queue { command, ack }) => {
                    if let Some(displaced) = shared.slot.submit(command) {
                        info!(?displaced, "pending command overwritten");
                    }
                    shared.force_tick.notify_one();
                    Response::Ack(ack)
                }
                Ok(Validated::Reply(response)) => response,
                Err(e) => Response::Error(e),
            }
        }
    }
}

async fn wait_for_snapshot<C>(
    shared: &Shared<C>,
    newer_than: Option<u64>,
) -> Option<StatusSnapshot> {
    let mut rx = shared.snapshot.subscribe();
    tokio::time::timeout(shared.force_timeout, async move {
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(snapshot) = current {
                match newer_than {
                    None => return Some(snapshot),
                    Some(t) if snapshot.time_ns > t => return Some(snapshot),
                    Some(_) => {}
                }
            }
            if rx.changed().await.is_err() {
                return None; // control loop gone
            }
        }
    })
    .await
    .ok()
    .flatten()
}
