//! RPC method dispatch.
//!
//! Every method takes a JSON object and returns JSON. Methods that act on
//! a session carry a `controller_token`; the dispatcher resolves it
//! through [`SimManager::lookup_controller`] and runs the operation on the
//! session's sim actor as the token's position. Methods with nothing to
//! return answer `{}`.

use std::sync::Arc;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracon_sim::{Sim, SimError, SimSnapshot};
use tracon_types::{
    Aircraft, Callsign, FlightRules, LaunchConfig, LeaderLineDirection, RestrictionArea, Tcp,
};

use crate::error::ServerError;
use crate::manager::SimManager;

/// Every method [`dispatch`] understands.
pub const METHODS: &[&str] = &[
    "new_sim",
    "connect_to_sim",
    "add_local",
    "running_sims",
    "broadcast",
    "sign_off",
    "change_control_position",
    "get_world_update",
    "get_serialize_sim",
    "toggle_pause",
    "set_sim_rate",
    "take_or_return_launch_control",
    "set_launch_config",
    "global_message",
    "delete_all_aircraft",
    "run_aircraft_commands",
    "initiate_track",
    "drop_track",
    "handoff_track",
    "accept_handoff",
    "cancel_handoff",
    "redirect_handoff",
    "accept_redirected_handoff",
    "point_out",
    "acknowledge_point_out",
    "recall_point_out",
    "reject_point_out",
    "force_ql",
    "set_scratchpad",
    "set_secondary_scratchpad",
    "set_global_leader_line",
    "toggle_spc_override",
    "release_departure",
    "set_temporary_altitude",
    "set_pilot_reported_altitude",
    "create_restriction_area",
    "update_restriction_area",
    "delete_restriction_area",
    "create_departure",
    "create_arrival",
    "create_overflight",
    "launch_aircraft",
];

// ---------------------------------------------------------------------------
// Argument structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TokenArgs {
    controller_token: String,
}

#[derive(Debug, Deserialize)]
struct AircraftArgs {
    controller_token: String,
    callsign: Callsign,
}

#[derive(Debug, Deserialize)]
struct AircraftToArgs {
    controller_token: String,
    callsign: Callsign,
    to: Tcp,
}

#[derive(Debug, Deserialize)]
struct ScratchpadArgs {
    controller_token: String,
    callsign: Callsign,
    #[serde(default)]
    scratchpad: String,
}

#[derive(Debug, Deserialize)]
struct LeaderLineArgs {
    controller_token: String,
    callsign: Callsign,
    #[serde(default)]
    direction: Option<LeaderLineDirection>,
}

#[derive(Debug, Deserialize)]
struct SpcArgs {
    controller_token: String,
    callsign: Callsign,
    spc: String,
}

#[derive(Debug, Deserialize)]
struct AltitudeArgs {
    controller_token: String,
    callsign: Callsign,
    altitude: i32,
}

#[derive(Debug, Deserialize)]
struct AircraftCommandsArgs {
    controller_token: String,
    callsign: Callsign,
    commands: String,
}

#[derive(Debug, Deserialize)]
struct ChangePositionArgs {
    controller_token: String,
    position: Tcp,
    #[serde(default)]
    keep_tracks: bool,
}

#[derive(Debug, Deserialize)]
struct SimRateArgs {
    controller_token: String,
    rate: f32,
}

#[derive(Debug, Deserialize)]
struct LaunchConfigArgs {
    controller_token: String,
    config: LaunchConfig,
}

#[derive(Debug, Deserialize)]
struct MessageArgs {
    controller_token: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct BroadcastArgs {
    password: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct CreateRestrictionAreaArgs {
    controller_token: String,
    area: RestrictionArea,
}

#[derive(Debug, Deserialize)]
struct UpdateRestrictionAreaArgs {
    controller_token: String,
    index: usize,
    area: RestrictionArea,
}

#[derive(Debug, Deserialize)]
struct RestrictionAreaIndexArgs {
    controller_token: String,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct CreateDepartureArgs {
    controller_token: String,
    airport: String,
    runway: String,
    #[serde(default)]
    rules: FlightRules,
}

#[derive(Debug, Deserialize)]
struct CreateArrivalArgs {
    controller_token: String,
    group: String,
    airport: String,
}

#[derive(Debug, Deserialize)]
struct CreateOverflightArgs {
    controller_token: String,
    group: String,
}

#[derive(Debug, Deserialize)]
struct LaunchAircraftArgs {
    controller_token: String,
    aircraft: Aircraft,
    #[serde(default)]
    departure_runway: Option<String>,
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Run `method` with the JSON arguments in `body`.
#[allow(clippy::too_many_lines)]
pub async fn dispatch(
    manager: &Arc<SimManager>,
    method: &str,
    body: &[u8],
) -> Result<Value, ServerError> {
    match method {
        // -- Session management ---------------------------------------------
        "new_sim" => to_json(&manager.new_sim(args(body)?).await?),
        "connect_to_sim" => to_json(&manager.connect_to_sim(args(body)?).await?),
        "add_local" => to_json(&manager.add_local(args::<SimSnapshot>(body)?).await?),
        "running_sims" => to_json(&manager.running_sims().await),
        "broadcast" => {
            let BroadcastArgs { password, message } = args(body)?;
            manager.broadcast(&password, &message).await?;
            Ok(empty())
        }
        "sign_off" => {
            let TokenArgs { controller_token } = args(body)?;
            manager.sign_off(&controller_token).await?;
            Ok(empty())
        }
        "change_control_position" => {
            let ChangePositionArgs {
                controller_token,
                position,
                keep_tracks,
            } = args(body)?;
            manager
                .change_control_position(&controller_token, position, keep_tracks)
                .await?;
            Ok(empty())
        }
        "get_world_update" => {
            let TokenArgs { controller_token } = args(body)?;
            to_json(&manager.get_world_update(&controller_token).await?)
        }
        "get_serialize_sim" => {
            let TokenArgs { controller_token } = args(body)?;
            to_json(&manager.get_serialize_sim(&controller_token).await?)
        }

        // -- Session-wide controls ------------------------------------------
        "toggle_pause" => {
            let TokenArgs { controller_token } = args(body)?;
            on_sim(manager, &controller_token, |sim, tcp| {
                sim.toggle_pause(tcp);
                Ok(())
            })
            .await?;
            Ok(empty())
        }
        "set_sim_rate" => {
            let SimRateArgs {
                controller_token,
                rate,
            } = args(body)?;
            on_sim(manager, &controller_token, move |sim, tcp| {
                sim.set_sim_rate(tcp, rate)
            })
            .await?;
            Ok(empty())
        }
        "take_or_return_launch_control" => {
            let TokenArgs { controller_token } = args(body)?;
            on_sim(manager, &controller_token, Sim::take_or_return_launch_control).await?;
            Ok(empty())
        }
        "set_launch_config" => {
            let LaunchConfigArgs {
                controller_token,
                config,
            } = args(body)?;
            on_sim(manager, &controller_token, move |sim, tcp| {
                sim.set_launch_config(tcp, config)
            })
            .await?;
            Ok(empty())
        }
        "global_message" => {
            let MessageArgs {
                controller_token,
                message,
            } = args(body)?;
            on_sim(manager, &controller_token, move |sim, tcp| {
                sim.global_message(tcp, &message);
                Ok(())
            })
            .await?;
            Ok(empty())
        }
        "delete_all_aircraft" => {
            let TokenArgs { controller_token } = args(body)?;
            on_sim(manager, &controller_token, Sim::delete_all_aircraft).await?;
            Ok(empty())
        }
        "run_aircraft_commands" => {
            let AircraftCommandsArgs {
                controller_token,
                callsign,
                commands,
            } = args(body)?;
            let result = on_sim(manager, &controller_token, move |sim, tcp| {
                Ok(sim.run_aircraft_commands(tcp, &callsign, &commands))
            })
            .await?;
            to_json(&result)
        }

        // -- Tracks ---------------------------------------------------------
        "initiate_track" => on_aircraft(manager, body, Sim::initiate_track).await,
        "drop_track" => on_aircraft(manager, body, Sim::drop_track).await,
        "accept_handoff" => on_aircraft(manager, body, Sim::accept_handoff).await,
        "cancel_handoff" => on_aircraft(manager, body, Sim::cancel_handoff).await,
        "accept_redirected_handoff" => {
            on_aircraft(manager, body, Sim::accept_redirected_handoff).await
        }
        "acknowledge_point_out" => on_aircraft(manager, body, Sim::acknowledge_point_out).await,
        "recall_point_out" => on_aircraft(manager, body, Sim::recall_point_out).await,
        "reject_point_out" => on_aircraft(manager, body, Sim::reject_point_out).await,
        "release_departure" => on_aircraft(manager, body, Sim::release_departure).await,
        "handoff_track" => on_aircraft_to(manager, body, Sim::handoff_track).await,
        "redirect_handoff" => on_aircraft_to(manager, body, Sim::redirect_handoff).await,
        "point_out" => on_aircraft_to(manager, body, Sim::point_out).await,
        "force_ql" => on_aircraft_to(manager, body, Sim::force_ql).await,
        "set_scratchpad" | "set_secondary_scratchpad" => {
            let secondary = method == "set_secondary_scratchpad";
            let ScratchpadArgs {
                controller_token,
                callsign,
                scratchpad,
            } = args(body)?;
            on_sim(manager, &controller_token, move |sim, tcp| {
                if secondary {
                    sim.set_secondary_scratchpad(tcp, &callsign, &scratchpad)
                } else {
                    sim.set_scratchpad(tcp, &callsign, &scratchpad)
                }
            })
            .await?;
            Ok(empty())
        }
        "set_global_leader_line" => {
            let LeaderLineArgs {
                controller_token,
                callsign,
                direction,
            } = args(body)?;
            on_sim(manager, &controller_token, move |sim, tcp| {
                sim.set_global_leader_line(tcp, &callsign, direction)
            })
            .await?;
            Ok(empty())
        }
        "toggle_spc_override" => {
            let SpcArgs {
                controller_token,
                callsign,
                spc,
            } = args(body)?;
            on_sim(manager, &controller_token, move |sim, tcp| {
                sim.toggle_spc_override(tcp, &callsign, &spc)
            })
            .await?;
            Ok(empty())
        }
        "set_temporary_altitude" | "set_pilot_reported_altitude" => {
            let pilot_reported = method == "set_pilot_reported_altitude";
            let AltitudeArgs {
                controller_token,
                callsign,
                altitude,
            } = args(body)?;
            on_sim(manager, &controller_token, move |sim, tcp| {
                if pilot_reported {
                    sim.set_pilot_reported_altitude(tcp, &callsign, altitude)
                } else {
                    sim.set_temporary_altitude(tcp, &callsign, altitude)
                }
            })
            .await?;
            Ok(empty())
        }

        // -- Restriction areas ----------------------------------------------
        "create_restriction_area" => {
            let CreateRestrictionAreaArgs {
                controller_token,
                area,
            } = args(body)?;
            let index = on_sim(manager, &controller_token, move |sim, _| {
                sim.create_restriction_area(area)
            })
            .await?;
            Ok(serde_json::json!({ "index": index }))
        }
        "update_restriction_area" => {
            let UpdateRestrictionAreaArgs {
                controller_token,
                index,
                area,
            } = args(body)?;
            on_sim(manager, &controller_token, move |sim, _| {
                sim.update_restriction_area(index, area)
            })
            .await?;
            Ok(empty())
        }
        "delete_restriction_area" => {
            let RestrictionAreaIndexArgs {
                controller_token,
                index,
            } = args(body)?;
            on_sim(manager, &controller_token, move |sim, _| {
                sim.delete_restriction_area(index)
            })
            .await?;
            Ok(empty())
        }

        // -- Aircraft generation --------------------------------------------
        "create_departure" => {
            let CreateDepartureArgs {
                controller_token,
                airport,
                runway,
                rules,
            } = args(body)?;
            let ac = on_sim(manager, &controller_token, move |sim, _| {
                sim.create_departure(&airport, &runway, rules)
            })
            .await?;
            to_json(&ac)
        }
        "create_arrival" => {
            let CreateArrivalArgs {
                controller_token,
                group,
                airport,
            } = args(body)?;
            let ac = on_sim(manager, &controller_token, move |sim, _| {
                sim.create_arrival(&group, &airport)
            })
            .await?;
            to_json(&ac)
        }
        "create_overflight" => {
            let CreateOverflightArgs {
                controller_token,
                group,
            } = args(body)?;
            let ac = on_sim(manager, &controller_token, move |sim, _| {
                sim.create_overflight(&group)
            })
            .await?;
            to_json(&ac)
        }
        "launch_aircraft" => {
            let LaunchAircraftArgs {
                controller_token,
                aircraft,
                departure_runway,
            } = args(body)?;
            let ac = on_sim(manager, &controller_token, move |sim, _| {
                let callsign = aircraft.callsign.clone();
                sim.launch_aircraft(aircraft, departure_runway.as_deref())?;
                sim.state()
                    .aircraft
                    .get(&callsign)
                    .cloned()
                    .ok_or(SimError::NoAircraftForCallsign)
            })
            .await?;
            to_json(&ac)
        }

        other => Err(ServerError::UnknownMethod(other.to_owned())),
    }
}

fn args<T: DeserializeOwned>(body: &[u8]) -> Result<T, ServerError> {
    Ok(serde_json::from_slice(body)?)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, ServerError> {
    Ok(serde_json::to_value(value)?)
}

fn empty() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Run `f` on the token's sim as the token's position.
async fn on_sim<R, F>(manager: &SimManager, token: &str, f: F) -> Result<R, ServerError>
where
    F: FnOnce(&mut Sim, &Tcp) -> Result<R, SimError> + Send + 'static,
    R: Send + 'static,
{
    let (tcp, sim) = manager.lookup_controller(token).await?;
    sim.try_call(move |sim| f(sim, &tcp)).await
}

async fn on_aircraft<F>(manager: &SimManager, body: &[u8], f: F) -> Result<Value, ServerError>
where
    F: FnOnce(&mut Sim, &Tcp, &Callsign) -> Result<(), SimError> + Send + 'static,
{
    let AircraftArgs {
        controller_token,
        callsign,
    } = args(body)?;
    on_sim(manager, &controller_token, move |sim, tcp| f(sim, tcp, &callsign)).await?;
    Ok(empty())
}

async fn on_aircraft_to<F>(manager: &SimManager, body: &[u8], f: F) -> Result<Value, ServerError>
where
    F: FnOnce(&mut Sim, &Tcp, &Callsign, &Tcp) -> Result<(), SimError> + Send + 'static,
{
    let AircraftToArgs {
        controller_token,
        callsign,
        to,
    } = args(body)?;
    on_sim(manager, &controller_token, move |sim, tcp| {
        f(sim, tcp, &callsign, &to)
    })
    .await?;
    Ok(empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::float_cmp)]
mod tests {
    use serde_json::json;
    use tracon_sim::ServerConfig;
    use tracon_types::{NavState, RadioTransmissionType};

    use super::*;

    const FACILITY: &str = r"
simulation:
  prespawn_seconds: 0
  seed: 3
tracons:
  N90:
    JFK:
      center: { lon: -73.78, lat: 40.64 }
      control_positions:
        2J: { position: Kennedy Final, radio_name: New York Approach, frequency: 132400, facility: N90 }
      scenarios:
        JFK 22L:
          solo_controller: 2J
          default_split: ONE
          split_configurations:
            ONE:
              2J: { primary: true }
";

    fn manager() -> Arc<SimManager> {
        Arc::new(SimManager::new(ServerConfig::parse(FACILITY).unwrap()))
    }

    async fn call(sm: &Arc<SimManager>, method: &str, body: &Value) -> Value {
        dispatch(sm, method, &serde_json::to_vec(body).unwrap())
            .await
            .unwrap()
    }

    fn commands(token: &str, commands: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "controller_token": token,
            "callsign": "AAL1",
            "commands": commands,
        }))
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_commands_apply_one_batch_at_a_time() {
        let sm = manager();
        let created = call(
            &sm,
            "new_sim",
            &json!({
                "new_sim_name": "alpha",
                "tracon": "N90",
                "group_name": "JFK",
                "scenario_name": "JFK 22L",
                "allow_instructor_rpo": true,
            }),
        )
        .await;
        let controller = created["controller_token"].as_str().unwrap().to_owned();
        let joined = call(
            &sm,
            "connect_to_sim",
            &json!({ "remote_sim": "alpha", "instructor": true }),
        )
        .await;
        let instructor = joined["controller_token"].as_str().unwrap().to_owned();

        let (_, sim) = sm.lookup_controller(&controller).await.unwrap();
        sim.try_call(|sim| {
            sim.launch_aircraft(
                Aircraft {
                    callsign: Callsign::from("AAL1"),
                    nav: NavState {
                        altitude: 6000.0,
                        speed: 250.0,
                        ..NavState::default()
                    },
                    controlling_controller: Some(Tcp::from("2J")),
                    ..Aircraft::default()
                },
                None,
            )
        })
        .await
        .unwrap();

        let (low, high) = (commands(&controller, "A50"), commands(&instructor, "A70"));
        let (low, high) = tokio::join!(
            dispatch(&sm, "run_aircraft_commands", &low),
            dispatch(&sm, "run_aircraft_commands", &high),
        );
        for reply in [low.unwrap(), high.unwrap()] {
            assert_eq!(reply["error_message"], "");
            assert_eq!(reply["remaining_input"], "");
        }

        let assigned = sim
            .call(|sim| sim.state().aircraft["AAL1"].nav.assigned_altitude)
            .await
            .unwrap()
            .unwrap();
        assert!(assigned == 5000.0 || assigned == 7000.0, "{assigned}");

        // The last readback heard is the clearance that stuck.
        let update = sm.get_world_update(&controller).await.unwrap();
        let readbacks: Vec<&str> = update
            .events
            .iter()
            .filter(|e| e.radio_transmission_type == Some(RadioTransmissionType::Readback))
            .map(|e| e.message.as_str())
            .collect();
        assert_eq!(readbacks.len(), 2);
        let expected = if assigned == 5000.0 {
            "descend and maintain 5,000"
        } else {
            "climb and maintain 7,000"
        };
        assert_eq!(readbacks.last().copied(), Some(expected));
    }
}
