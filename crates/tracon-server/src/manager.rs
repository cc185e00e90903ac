//! The session registry.
//!
//! [`SimManager`] owns every running session, maps controller tokens to
//! (position, session) pairs, and runs one driver task per session that
//! advances the sim, evicts silent controllers, and tears the session down
//! once it has been idle long enough.
//!
//! # Locking
//!
//! The registry sits behind one async mutex; each session keeps its
//! connection table behind another. When more than one is needed they are
//! taken in a fixed order: registry, then connection table, then the sim
//! actor.
//!
//! # Tokens
//!
//! A token is 16 bytes from the thread-local CSPRNG, base64 encoded. It is
//! the only proof of identity an RPC carries and stays valid until its
//! controller signs off (or is signed off for being silent).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{Instrument, error, info, info_span, warn};
use tracon_sim::config::ScenarioGroup;
use tracon_sim::{
    NewSimConfiguration, ServerConfig, Sim, SimSnapshot, SimulationSettings, State,
};
use tracon_types::{Controller, Event, EventType, SessionId, Tcp, WorldUpdate};

use crate::error::ServerError;
use crate::session::SimHandle;

/// Position an instructor-only connection signs on to.
pub const INSTRUCTOR_POSITION: &str = "INS";

/// Position a remote pilot operator signs on to.
pub const RPO_POSITION: &str = "RPO";

// ---------------------------------------------------------------------------
// Requests and results
// ---------------------------------------------------------------------------

/// Request to start a new session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewSimRequest {
    /// Unique session name; empty is the local session.
    pub new_sim_name: String,
    /// TRACON identifier.
    pub tracon: String,
    /// Scenario group within the TRACON.
    pub group_name: String,
    /// Scenario within the group.
    pub scenario_name: String,
    /// Split to staff; empty uses the scenario's default.
    pub selected_split: String,
    /// Password others must give to join; empty for none.
    pub password: String,
    /// Offer the instructor and remote pilot positions.
    pub allow_instructor_rpo: bool,
    /// Sign the creator on as an instructor too.
    pub instructor: bool,
    /// Simulated start time; defaults to now.
    pub start_time: Option<DateTime<Utc>>,
}

/// Request to join a running session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConnectionRequest {
    /// Name of the session to join.
    pub remote_sim: String,
    /// Position to take; empty joins as instructor only.
    pub position: Tcp,
    /// Session password, if it has one.
    pub password: String,
    /// Join as an instructor. Only honored without a position.
    pub instructor: bool,
}

/// What a controller gets back on joining a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSimResult {
    /// The sim's state at sign-on.
    pub state: State,
    /// Token for every later call.
    pub controller_token: String,
    /// Speech websocket port; 0 when speech is unavailable.
    pub speech_ws_port: u16,
}

/// A running session as listed to clients choosing one to join.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSim {
    /// Scenario group the session was built from.
    pub group_name: String,
    /// Scenario the session was built from.
    pub scenario_name: String,
    /// The session's primary position.
    pub primary_controller: Tcp,
    /// Joining needs a password.
    pub require_password: bool,
    /// Positions open for sign-on.
    pub available_positions: BTreeMap<Tcp, Controller>,
    /// Positions held by humans.
    pub covered_positions: BTreeMap<Tcp, Controller>,
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Per-position connection bookkeeping for idle eviction.
#[derive(Debug)]
struct ConnectionState {
    token: String,
    last_update_call: Instant,
    warned_no_update_calls: bool,
}

impl ConnectionState {
    fn new(token: String) -> Self {
        Self {
            token,
            last_update_call: Instant::now(),
            warned_no_update_calls: false,
        }
    }
}

#[derive(Debug)]
struct SimSession {
    id: SessionId,
    name: String,
    group_name: String,
    scenario_name: String,
    password: String,
    sim: SimHandle,
    connections: Mutex<BTreeMap<Tcp, ConnectionState>>,
    /// Set when a newer local session takes this one's name.
    retired: AtomicBool,
}

impl SimSession {
    fn new(
        name: String,
        group_name: String,
        scenario_name: String,
        password: String,
        sim: Sim,
    ) -> Self {
        Self {
            id: SessionId::new(),
            name,
            group_name,
            scenario_name,
            password,
            sim: SimHandle::spawn(sim),
            connections: Mutex::new(BTreeMap::new()),
            retired: AtomicBool::new(false),
        }
    }

    /// Record a poll from `tcp`, announcing it if it had gone quiet.
    async fn got_update_call(&self, tcp: &Tcp) {
        let back_online = {
            let mut connections = self.connections.lock().await;
            match connections.get_mut(tcp) {
                Some(conn) => {
                    conn.last_update_call = Instant::now();
                    std::mem::take(&mut conn.warned_no_update_calls)
                }
                None => {
                    error!(tcp = %tcp, "Update call for unknown position");
                    false
                }
            }
        };

        if back_online {
            warn!(tcp = %tcp, "Connection re-established");
            let message = format!("{tcp} is back online.");
            if let Err(err) = self
                .sim
                .call(move |sim| sim.post_event(Event::status(message)))
                .await
            {
                error!(tcp = %tcp, error = %err, "Unable to post reconnect message");
            }
        }
    }
}

#[derive(Debug)]
struct ControllerSession {
    tcp: Tcp,
    session: Arc<SimSession>,
}

#[derive(Debug, Default)]
struct Registry {
    sessions: BTreeMap<String, Arc<SimSession>>,
    by_token: HashMap<String, ControllerSession>,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Registry of running sessions and the controllers signed on to them.
#[derive(Debug)]
pub struct SimManager {
    tracons: BTreeMap<String, BTreeMap<String, ScenarioGroup>>,
    settings: SimulationSettings,
    broadcast_password: String,
    local: bool,
    started: DateTime<Utc>,
    registry: Mutex<Registry>,
}

impl SimManager {
    /// Build an empty manager over the configured facilities.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            tracons: config.tracons,
            settings: config.simulation,
            broadcast_password: config.broadcast_password,
            local: config.server.local,
            started: Utc::now(),
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Whether this is a single-user local server.
    pub const fn is_local(&self) -> bool {
        self.local
    }

    /// When the manager was created.
    pub const fn started(&self) -> DateTime<Utc> {
        self.started
    }

    /// Number of running sessions.
    pub async fn session_count(&self) -> usize {
        self.registry.lock().await.sessions.len()
    }

    /// Start a new session and sign its creator on to the primary
    /// position.
    pub async fn new_sim(self: &Arc<Self>, req: NewSimRequest) -> Result<NewSimResult, ServerError> {
        let config = self.make_sim_configuration(&req)?;
        let sim = Sim::new(config, &self.settings);
        let primary = sim.state().primary_controller.clone();
        let session = Arc::new(SimSession::new(
            req.new_sim_name,
            req.group_name,
            req.scenario_name,
            req.password,
            sim,
        ));
        self.add(session, primary, req.instructor, true).await
    }

    /// Load a serialized sim as the local session.
    pub async fn add_local(self: &Arc<Self>, snapshot: SimSnapshot) -> Result<NewSimResult, ServerError> {
        if !self.local {
            warn!("Loading a local sim on a multi-user server");
        }
        let sim = Sim::from_snapshot(snapshot, &self.settings);
        let primary = sim.state().primary_controller.clone();
        let session = Arc::new(SimSession::new(
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            sim,
        ));
        self.add(session, primary, false, false).await
    }

    async fn add(
        self: &Arc<Self>,
        session: Arc<SimSession>,
        tcp: Tcp,
        instructor: bool,
        prespawn: bool,
    ) -> Result<NewSimResult, ServerError> {
        let token = {
            let mut registry = self.registry.lock().await;
            // The empty name is the local session and may be replaced.
            if !session.name.is_empty() && registry.sessions.contains_key(&session.name) {
                return Err(ServerError::DuplicateSimName);
            }

            let token = sign_on(&session, &tcp, instructor).await?;
            registry.by_token.insert(
                token.clone(),
                ControllerSession {
                    tcp: tcp.clone(),
                    session: Arc::clone(&session),
                },
            );
            if let Some(previous) = registry
                .sessions
                .insert(session.name.clone(), Arc::clone(&session))
            {
                info!("Replacing local sim");
                previous.retired.store(true, Ordering::Release);
                registry
                    .by_token
                    .retain(|_, ctrl| !Arc::ptr_eq(&ctrl.session, &previous));
            }
            token
        };
        info!(sim_name = %session.name, tcp = %tcp, "Added sim");

        let prepared = async {
            if prespawn {
                session.sim.call(Sim::prespawn).await?;
            }
            session.sim.call(|sim| sim.state().clone()).await
        }
        .await;
        let state = match prepared {
            Ok(state) => state,
            Err(err) => {
                // Nothing will drive this session; its token must not resolve.
                error!(sim_name = %session.name, error = %err, "Unable to start sim");
                let mut registry = self.registry.lock().await;
                unregister(&mut registry, &session);
                return Err(err);
            }
        };

        let span = info_span!("sim", sim_name = %session.name, session_id = %session.id);
        tokio::spawn(Arc::clone(self).drive(session).instrument(span));

        Ok(NewSimResult {
            state,
            controller_token: token,
            speech_ws_port: 0,
        })
    }

    /// Join a running session.
    pub async fn connect_to_sim(&self, req: SimConnectionRequest) -> Result<NewSimResult, ServerError> {
        let (session, token) = {
            let mut registry = self.registry.lock().await;
            let session = registry
                .sessions
                .get(&req.remote_sim)
                .cloned()
                .ok_or(ServerError::NoNamedSim)?;
            if !session.password.is_empty() && req.password != session.password {
                return Err(ServerError::InvalidPassword);
            }

            // A dedicated instructor position ignores the extra flag.
            let instructor = req.instructor && req.position.is_empty();
            let tcp = if req.position.is_empty() {
                Tcp::from(INSTRUCTOR_POSITION)
            } else {
                req.position
            };

            let token = sign_on(&session, &tcp, instructor).await?;
            registry.by_token.insert(
                token.clone(),
                ControllerSession {
                    tcp,
                    session: Arc::clone(&session),
                },
            );
            (session, token)
        };

        let state = session.sim.call(|sim| sim.state().clone()).await?;
        Ok(NewSimResult {
            state,
            controller_token: token,
            speech_ws_port: 0,
        })
    }

    /// Sign off the controller holding `token`. The token is gone for
    /// good afterwards.
    pub async fn sign_off(&self, token: &str) -> Result<(), ServerError> {
        let mut registry = self.registry.lock().await;
        let ctrl = registry
            .by_token
            .remove(token)
            .ok_or(ServerError::NoSimForControllerToken)?;
        ctrl.session.connections.lock().await.remove(&ctrl.tcp);

        let tcp = ctrl.tcp;
        ctrl.session
            .sim
            .try_call(move |sim| sim.sign_off(&tcp))
            .await
    }

    /// Move the token's controller to `to`. The token follows them.
    pub async fn change_control_position(
        &self,
        token: &str,
        to: Tcp,
        keep_tracks: bool,
    ) -> Result<(), ServerError> {
        let mut registry = self.registry.lock().await;
        let ctrl = registry
            .by_token
            .get_mut(token)
            .ok_or(ServerError::NoSimForControllerToken)?;

        let (from, target) = (ctrl.tcp.clone(), to.clone());
        ctrl.session
            .sim
            .try_call(move |sim| sim.change_control_position(&from, &target, keep_tracks))
            .await?;

        {
            let mut connections = ctrl.session.connections.lock().await;
            if let Some(conn) = connections.remove(&ctrl.tcp) {
                connections.insert(to.clone(), conn);
            }
        }
        info!(from = %ctrl.tcp, to = %to, "Token moved to new position");
        ctrl.tcp = to;
        Ok(())
    }

    /// Resolve a token to its position and sim.
    pub async fn lookup_controller(&self, token: &str) -> Result<(Tcp, SimHandle), ServerError> {
        let registry = self.registry.lock().await;
        registry
            .by_token
            .get(token)
            .map(|ctrl| (ctrl.tcp.clone(), ctrl.session.sim.clone()))
            .ok_or(ServerError::NoSimForControllerToken)
    }

    /// Poll for the token's view of the world. Counts as a sign of life
    /// for idle eviction.
    pub async fn get_world_update(&self, token: &str) -> Result<WorldUpdate, ServerError> {
        let (tcp, session) = {
            let registry = self.registry.lock().await;
            let ctrl = registry
                .by_token
                .get(token)
                .ok_or(ServerError::NoSimForControllerToken)?;
            (ctrl.tcp.clone(), Arc::clone(&ctrl.session))
        };

        session.got_update_call(&tcp).await;
        session.sim.call(move |sim| sim.get_world_update(&tcp)).await
    }

    /// Serialize the token's sim for transfer.
    pub async fn get_serialize_sim(&self, token: &str) -> Result<SimSnapshot, ServerError> {
        let (_, sim) = self.lookup_controller(token).await?;
        sim.call(|sim| sim.serialize_snapshot()).await
    }

    /// Every running session with its open and covered positions.
    pub async fn running_sims(&self) -> BTreeMap<String, RemoteSim> {
        let registry = self.registry.lock().await;
        let listings = registry.sessions.iter().map(|(name, session)| async move {
            let positions = session
                .sim
                .call(|sim| {
                    let (available, covered) = sim.available_covered_positions();
                    (sim.state().primary_controller.clone(), available, covered)
                })
                .await;
            match positions {
                Ok((primary_controller, available_positions, covered_positions)) => Some((
                    name.clone(),
                    RemoteSim {
                        group_name: session.group_name.clone(),
                        scenario_name: session.scenario_name.clone(),
                        primary_controller,
                        require_password: !session.password.is_empty(),
                        available_positions,
                        covered_positions,
                    },
                )),
                Err(err) => {
                    warn!(sim_name = %name, error = %err, "Skipping unresponsive sim");
                    None
                }
            }
        });
        join_all(listings).await.into_iter().flatten().collect()
    }

    /// Post an operator message to every session.
    pub async fn broadcast(&self, password: &str, message: &str) -> Result<(), ServerError> {
        if self.broadcast_password.is_empty() || password != self.broadcast_password {
            return Err(ServerError::InvalidPassword);
        }

        info!(message, "Broadcasting message");
        let registry = self.registry.lock().await;
        let posts = registry.sessions.values().map(|session| {
            let event = Event {
                message: message.to_owned(),
                ..Event::new(EventType::ServerBroadcastMessage)
            };
            session.sim.call(move |sim| sim.post_event(event))
        });
        for result in join_all(posts).await {
            if let Err(err) = result {
                warn!(error = %err, "Broadcast not delivered");
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Session configuration
    // -----------------------------------------------------------------------

    fn make_sim_configuration(&self, req: &NewSimRequest) -> Result<NewSimConfiguration, ServerError> {
        let Some(group) = self
            .tracons
            .get(&req.tracon)
            .and_then(|groups| groups.get(&req.group_name))
        else {
            warn!(tracon = %req.tracon, group = %req.group_name, "Unknown TRACON or scenario group");
            return Err(ServerError::InvalidSimConfiguration);
        };
        let Some(scenario) = group.scenarios.get(&req.scenario_name) else {
            warn!(scenario = %req.scenario_name, "Unknown scenario");
            return Err(ServerError::InvalidSimConfiguration);
        };

        let description = if self.local {
            format!(" {}", req.scenario_name)
        } else {
            format!("@{}: {}", req.new_sim_name, req.scenario_name)
        };
        let mut config = NewSimConfiguration::from_scenario(&req.tracon, description, group, scenario);
        config.is_local = self.local;
        config.start_time = req.start_time.unwrap_or_else(Utc::now);

        let sign_on: Vec<Tcp> = if self.local {
            config.primary_controller = scenario.solo_controller.clone();
            vec![scenario.solo_controller.clone()]
        } else {
            let split_name = if req.selected_split.is_empty() {
                &scenario.default_split
            } else {
                &req.selected_split
            };
            let Some(split) = scenario.split_configurations.get(split_name) else {
                warn!(split = %split_name, "Unknown split configuration");
                return Err(ServerError::InvalidSimConfiguration);
            };
            let Some(primary) = split.primary() else {
                warn!(split = %split_name, "Split has no primary position");
                return Err(ServerError::InvalidSimConfiguration);
            };
            config.primary_controller = primary.clone();
            config.multi_controllers = Some(split.clone());
            split.positions().cloned().collect()
        };

        for tcp in sign_on {
            match group.control_positions.get(&tcp) {
                Some(ctrl) => {
                    config.sign_on_positions.insert(tcp, ctrl.clone());
                }
                None => error!(tcp = %tcp, "Split names an unknown control position"),
            }
        }
        if req.allow_instructor_rpo {
            config.sign_on_positions.insert(
                Tcp::from(INSTRUCTOR_POSITION),
                Controller {
                    position: String::from("Instructor"),
                    instructor: true,
                    ..Controller::default()
                },
            );
            config.sign_on_positions.insert(
                Tcp::from(RPO_POSITION),
                Controller {
                    position: String::from("Remote Pilot Operator"),
                    rpo: true,
                    ..Controller::default()
                },
            );
        }
        Ok(config)
    }

    // -----------------------------------------------------------------------
    // Session driver
    // -----------------------------------------------------------------------

    async fn drive(self: Arc<Self>, session: Arc<SimSession>) {
        let poll = Duration::from_millis(self.settings.poll_interval_ms);
        while !self.sim_should_exit(&session).await {
            // Local users are never evicted, e.g. when their laptop sleeps.
            if !self.local {
                self.cull_idle_controllers(&session).await;
            }

            match session.sim.call(Sim::update).await {
                // Panics are logged by the actor; keep driving.
                Ok(()) | Err(ServerError::SessionPanicked(_)) => {}
                Err(err) => {
                    error!(error = %err, "Sim update failed");
                    break;
                }
            }
            tokio::time::sleep(poll).await;
        }

        let idle = session
            .sim
            .call(|sim| sim.idle_time())
            .await
            .unwrap_or_default();
        info!(idle_secs = idle.as_secs(), "Terminating sim");
        self.remove_session(&session).await;
    }

    /// A session exits once it has been idle past the limit and more than
    /// `max_idle_sims` sessions, itself included, are equally idle. The
    /// decision and the unregistering happen under one registry lock, so
    /// concurrent drivers never overshoot the quota.
    async fn sim_should_exit(&self, session: &Arc<SimSession>) -> bool {
        if session.retired.load(Ordering::Acquire) {
            return true;
        }

        let limit = Duration::from_secs(self.settings.idle_limit_secs);
        let Ok(idle) = session.sim.call(|sim| sim.idle_time()).await else {
            return true;
        };
        if idle < limit {
            return false;
        }

        let mut registry = self.registry.lock().await;
        let idle_times = registry
            .sessions
            .values()
            .map(|s| s.sim.call(|sim| sim.idle_time()));
        let n_idle = join_all(idle_times)
            .await
            .into_iter()
            .filter(|idle| idle.as_ref().is_ok_and(|idle| *idle >= limit))
            .count();
        if n_idle <= self.settings.max_idle_sims {
            return false;
        }
        unregister(&mut registry, session);
        true
    }

    async fn cull_idle_controllers(&self, session: &SimSession) {
        let warn_after = Duration::from_secs(self.settings.idle_warn_secs);
        let sign_off_after = Duration::from_secs(self.settings.idle_sign_off_secs);
        let now = Instant::now();

        let mut warn_positions = Vec::new();
        let mut stale_tokens = Vec::new();
        {
            let mut connections = session.connections.lock().await;
            for (tcp, conn) in connections.iter_mut() {
                let silent = now.saturating_duration_since(conn.last_update_call);
                if silent <= warn_after {
                    continue;
                }
                if !conn.warned_no_update_calls {
                    conn.warned_no_update_calls = true;
                    warn!(tcp = %tcp, silent_secs = silent.as_secs(), "No update calls");
                    warn_positions.push(tcp.clone());
                }
                if silent > sign_off_after {
                    warn!(tcp = %tcp, "Signing off idle controller");
                    stale_tokens.push(conn.token.clone());
                }
            }
        }

        let warn_secs = self.settings.idle_warn_secs;
        for tcp in warn_positions {
            let message =
                format!("{tcp} has not been heard from for {warn_secs} seconds. Connection lost?");
            if let Err(err) = session
                .sim
                .call(move |sim| sim.post_event(Event::status(message)))
                .await
            {
                error!(error = %err, "Unable to post idle warning");
            }
        }
        // Signing off takes the registry lock, so the connection table
        // must be released first.
        for token in stale_tokens {
            if let Err(err) = self.sign_off(&token).await {
                error!(error = %err, "Error signing off idle controller");
            }
        }
    }

    async fn remove_session(&self, session: &Arc<SimSession>) {
        let mut registry = self.registry.lock().await;
        unregister(&mut registry, session);
    }
}

/// Drop `session` and every token pointing at it. A newer session that
/// took over the name is left alone.
fn unregister(registry: &mut Registry, session: &Arc<SimSession>) {
    registry
        .by_token
        .retain(|_, ctrl| !Arc::ptr_eq(&ctrl.session, session));
    if registry
        .sessions
        .get(&session.name)
        .is_some_and(|s| Arc::ptr_eq(s, session))
    {
        registry.sessions.remove(&session.name);
    }
}

/// Sign a human on to `tcp` and record the connection. The caller holds
/// the registry lock.
async fn sign_on(session: &SimSession, tcp: &Tcp, instructor: bool) -> Result<String, ServerError> {
    let position = tcp.clone();
    session
        .sim
        .try_call(move |sim| sim.sign_on(&position, instructor))
        .await?;

    let token = mint_token();
    session
        .connections
        .lock()
        .await
        .insert(tcp.clone(), ConnectionState::new(token.clone()));
    Ok(token)
}

fn mint_token() -> String {
    let mut buf = [0u8; 16];
    rand::rng().fill(&mut buf);
    STANDARD.encode(buf)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;

    const FACILITY: &str = r"
broadcast_password: hunter2
simulation:
  prespawn_seconds: 0
  seed: 7
  idle_limit_secs: 60
  max_idle_sims: 1
tracons:
  N90:
    JFK:
      center: { lon: -73.78, lat: 40.64 }
      control_positions:
        2J: { position: Kennedy Final, radio_name: New York Approach, frequency: 132400, facility: N90 }
        4P: { position: Kennedy Departure, radio_name: New York Departure, frequency: 135900, facility: N90 }
        N4P: { position: Center, radio_name: New York Center, frequency: 128300, facility: ZNY }
      scenarios:
        JFK 22L:
          solo_controller: 2J
          default_split: ONE
          split_configurations:
            ONE:
              2J: { primary: true }
            TWO:
              2J: { primary: true }
              4P: { backup: 2J }
          virtual_controllers: [N4P]
";

    fn manager(local: bool) -> Arc<SimManager> {
        let mut config = ServerConfig::parse(FACILITY).unwrap();
        config.server.local = local;
        Arc::new(SimManager::new(config))
    }

    fn request(name: &str) -> NewSimRequest {
        NewSimRequest {
            new_sim_name: name.to_owned(),
            tracon: "N90".to_owned(),
            group_name: "JFK".to_owned(),
            scenario_name: "JFK 22L".to_owned(),
            selected_split: "TWO".to_owned(),
            ..NewSimRequest::default()
        }
    }

    fn connect(name: &str, position: &str) -> SimConnectionRequest {
        SimConnectionRequest {
            remote_sim: name.to_owned(),
            position: Tcp::from(position),
            ..SimConnectionRequest::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn new_sim_signs_on_the_primary() {
        let sm = manager(false);
        let result = sm.new_sim(request("alpha")).await.unwrap();

        assert_eq!(STANDARD.decode(&result.controller_token).unwrap().len(), 16);
        assert_eq!(result.speech_ws_port, 0);
        assert_eq!(result.state.primary_controller, Tcp::from("2J"));
        assert_eq!(result.state.human_controllers, vec![Tcp::from("2J")]);
        assert_eq!(result.state.description, "@alpha: JFK 22L");

        let (tcp, _) = sm.lookup_controller(&result.controller_token).await.unwrap();
        assert_eq!(tcp, Tcp::from("2J"));
    }

    /// Motion model that fails on the first step.
    #[derive(Debug)]
    struct Broken;

    impl tracon_sim::dynamics::AircraftDynamics for Broken {
        fn update(&self, _: &mut tracon_types::Aircraft) -> Option<tracon_types::Waypoint> {
            panic!("motion model failed")
        }

        fn distance_to_end_of_approach(&self, _: &tracon_types::Aircraft) -> Option<f32> {
            None
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_prespawn_unregisters_the_session() {
        let sm = manager(false);
        let config = sm.make_sim_configuration(&request("alpha")).unwrap();
        let settings = SimulationSettings {
            prespawn_seconds: 5,
            ..sm.settings.clone()
        };
        let mut sim = Sim::new(config, &settings).with_dynamics(Box::new(Broken));
        sim.launch_aircraft(
            tracon_types::Aircraft {
                callsign: tracon_types::Callsign::from("AAL1"),
                ..tracon_types::Aircraft::default()
            },
            None,
        )
        .unwrap();
        let session = Arc::new(SimSession::new(
            "alpha".to_owned(),
            "JFK".to_owned(),
            "JFK 22L".to_owned(),
            String::new(),
            sim,
        ));

        let err = sm
            .add(session, Tcp::from("2J"), false, true)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::SessionPanicked(_)));
        assert_eq!(sm.session_count().await, 0);
        assert!(sm.registry.lock().await.by_token.is_empty());

        // The name is free again.
        sm.new_sim(request("alpha")).await.unwrap();
        assert_eq!(sm.session_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_name_leaves_existing_session_untouched() {
        let sm = manager(false);
        let first = sm.new_sim(request("alpha")).await.unwrap();

        let err = sm.new_sim(request("alpha")).await.unwrap_err();
        assert!(matches!(err, ServerError::DuplicateSimName));

        assert_eq!(sm.session_count().await, 1);
        let update = sm.get_world_update(&first.controller_token).await.unwrap();
        assert_eq!(update.human_controllers, vec![Tcp::from("2J")]);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_scenario_or_split_is_rejected() {
        let sm = manager(false);
        let err = sm
            .new_sim(NewSimRequest {
                scenario_name: "JFK 31L".to_owned(),
                ..request("alpha")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidSimConfiguration));

        let err = sm
            .new_sim(NewSimRequest {
                selected_split: "THREE".to_owned(),
                ..request("alpha")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidSimConfiguration));
        assert_eq!(sm.session_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn local_sessions_use_the_solo_controller() {
        let sm = manager(true);
        let result = sm
            .new_sim(NewSimRequest {
                selected_split: String::new(),
                ..request("")
            })
            .await
            .unwrap();
        assert_eq!(result.state.primary_controller, Tcp::from("2J"));
        assert!(result.state.is_local);
        assert_eq!(result.state.description, " JFK 22L");
    }

    #[tokio::test(start_paused = true)]
    async fn connect_checks_name_password_and_position() {
        let sm = manager(false);
        sm.new_sim(NewSimRequest {
            password: "secret".to_owned(),
            ..request("alpha")
        })
        .await
        .unwrap();

        let err = sm.connect_to_sim(connect("beta", "4P")).await.unwrap_err();
        assert!(matches!(err, ServerError::NoNamedSim));

        let err = sm.connect_to_sim(connect("alpha", "4P")).await.unwrap_err();
        assert!(matches!(err, ServerError::InvalidPassword));

        let joined = sm
            .connect_to_sim(SimConnectionRequest {
                password: "secret".to_owned(),
                ..connect("alpha", "4P")
            })
            .await
            .unwrap();
        let (tcp, _) = sm.lookup_controller(&joined.controller_token).await.unwrap();
        assert_eq!(tcp, Tcp::from("4P"));

        let err = sm
            .connect_to_sim(SimConnectionRequest {
                password: "secret".to_owned(),
                ..connect("alpha", "4P")
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServerError::Sim(tracon_sim::SimError::ControllerAlreadySignedIn)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn instructor_only_connection_takes_the_instructor_position() {
        let sm = manager(false);
        sm.new_sim(NewSimRequest {
            allow_instructor_rpo: true,
            ..request("alpha")
        })
        .await
        .unwrap();

        let joined = sm
            .connect_to_sim(SimConnectionRequest {
                remote_sim: "alpha".to_owned(),
                instructor: true,
                ..SimConnectionRequest::default()
            })
            .await
            .unwrap();
        let update = sm.get_world_update(&joined.controller_token).await.unwrap();
        assert_eq!(update.instructors, vec![Tcp::from(INSTRUCTOR_POSITION)]);
    }

    #[tokio::test(start_paused = true)]
    async fn sign_off_invalidates_the_token() {
        let sm = manager(false);
        let result = sm.new_sim(request("alpha")).await.unwrap();
        let joined = sm.connect_to_sim(connect("alpha", "4P")).await.unwrap();

        sm.sign_off(&joined.controller_token).await.unwrap();
        let err = sm.sign_off(&joined.controller_token).await.unwrap_err();
        assert!(matches!(err, ServerError::NoSimForControllerToken));

        let update = sm.get_world_update(&result.controller_token).await.unwrap();
        assert_eq!(update.human_controllers, vec![Tcp::from("2J")]);
    }

    #[tokio::test(start_paused = true)]
    async fn change_control_position_rebinds_the_token() {
        let sm = manager(false);
        sm.new_sim(NewSimRequest {
            allow_instructor_rpo: true,
            ..request("alpha")
        })
        .await
        .unwrap();
        let joined = sm.connect_to_sim(connect("alpha", "4P")).await.unwrap();
        let token = joined.controller_token;

        let err = sm
            .change_control_position(&token, Tcp::from("2J"), true)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServerError::Sim(tracon_sim::SimError::ControllerAlreadySignedIn)
        ));
        let (tcp, _) = sm.lookup_controller(&token).await.unwrap();
        assert_eq!(tcp, Tcp::from("4P"));

        sm.change_control_position(&token, Tcp::from(RPO_POSITION), false)
            .await
            .unwrap();
        let (tcp, _) = sm.lookup_controller(&token).await.unwrap();
        assert_eq!(tcp, Tcp::from(RPO_POSITION));

        let update = sm.get_world_update(&token).await.unwrap();
        assert!(update.human_controllers.contains(&Tcp::from(RPO_POSITION)));
        assert!(!update.human_controllers.contains(&Tcp::from("4P")));
    }

    #[tokio::test(start_paused = true)]
    async fn broadcast_requires_the_password() {
        let sm = manager(false);
        let result = sm.new_sim(request("alpha")).await.unwrap();

        let err = sm.broadcast("wrong", "hello").await.unwrap_err();
        assert!(matches!(err, ServerError::InvalidPassword));

        sm.broadcast("hunter2", "Server restart at 0400Z").await.unwrap();
        let update = sm.get_world_update(&result.controller_token).await.unwrap();
        assert!(update.events.iter().any(|e| {
            e.event_type == EventType::ServerBroadcastMessage
                && e.message == "Server restart at 0400Z"
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn running_sims_lists_positions() {
        let sm = manager(false);
        sm.new_sim(NewSimRequest {
            password: "secret".to_owned(),
            ..request("alpha")
        })
        .await
        .unwrap();

        let running = sm.running_sims().await;
        let alpha = &running["alpha"];
        assert!(alpha.require_password);
        assert_eq!(alpha.group_name, "JFK");
        assert_eq!(alpha.primary_controller, Tcp::from("2J"));
        assert!(alpha.covered_positions.contains_key("2J"));
        assert!(alpha.available_positions.contains_key("4P"));
        assert!(!alpha.available_positions.contains_key("2J"));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_controllers_are_warned_then_signed_off() {
        let sm = manager(false);
        let result = sm.new_sim(request("alpha")).await.unwrap();
        let token = result.controller_token;

        tokio::time::sleep(Duration::from_secs(6)).await;
        let update = sm.get_world_update(&token).await.unwrap();
        let messages: Vec<&str> = update.events.iter().map(|e| e.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.contains("Connection lost?")));
        assert!(messages.contains(&"2J is back online."));

        tokio::time::sleep(Duration::from_secs(16)).await;
        let err = sm.get_world_update(&token).await.unwrap_err();
        assert!(matches!(err, ServerError::NoSimForControllerToken));
    }

    #[tokio::test(start_paused = true)]
    async fn local_controllers_are_never_evicted() {
        let sm = manager(true);
        let result = sm.new_sim(request("")).await.unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(sm.get_world_update(&result.controller_token).await.is_ok());
    }

    async fn pause(sm: &SimManager, token: &str) {
        let (tcp, sim) = sm.lookup_controller(token).await.unwrap();
        sim.call(move |sim| sim.toggle_pause(&tcp)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_exit_only_past_the_idle_quota() {
        let sm = manager(true);
        let a = sm.new_sim(request("a")).await.unwrap();
        sm.new_sim(request("b")).await.unwrap();

        // One idle session is within the quota.
        pause(&sm, &a.controller_token).await;
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(sm.session_count().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_over_quota_are_torn_down() {
        let sm = manager(true);
        let a = sm.new_sim(request("a")).await.unwrap();
        let b = sm.new_sim(request("b")).await.unwrap();

        pause(&sm, &a.controller_token).await;
        pause(&sm, &b.controller_token).await;
        tokio::time::sleep(Duration::from_secs(61)).await;

        // Both are idle; one exits and the survivor is within the quota.
        assert_eq!(sm.session_count().await, 1);
        let a_alive = sm.lookup_controller(&a.controller_token).await.is_ok();
        let b_alive = sm.lookup_controller(&b.controller_token).await.is_ok();
        assert!(a_alive ^ b_alive);
    }

    #[tokio::test(start_paused = true)]
    async fn serialized_sim_reloads_as_the_local_session() {
        let sm = manager(true);
        let result = sm.new_sim(request("")).await.unwrap();

        let snapshot = sm.get_serialize_sim(&result.controller_token).await.unwrap();
        assert!(snapshot.state.human_controllers.is_empty());
        assert!(!snapshot.state.controllers.contains_key("2J"));

        let reloaded = sm.add_local(snapshot).await.unwrap();
        assert_eq!(reloaded.state.human_controllers, vec![Tcp::from("2J")]);
        assert_eq!(sm.session_count().await, 1);

        // The replaced session's token no longer resolves.
        let err = sm.lookup_controller(&result.controller_token).await.unwrap_err();
        assert!(matches!(err, ServerError::NoSimForControllerToken));
    }
}
