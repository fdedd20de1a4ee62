// src/server/listener.rs

//! Implements the TCP listener of the monitor: keepers and operators send
//! newline-delimited JSON requests and read one JSON response per line.
//! A connection that issues `listen` switches into notification streaming.

use crate::core::monitor::node_active::NodeActiveParams;
use crate::core::monitor::registration::RegisterParams;
use crate::core::{Monitor, MonitorError};
use crate::core::{events::STATE_CHANNEL, metrics};
use crate::server::protocol::{self, Request};
use anyhow::Result;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, info, warn};

/// Spawns the main TCP listener loop for the monitor.
pub async fn run_listener(host: &str, port: u16, monitor: Arc<Monitor>) -> Result<()> {
    let listener = TcpListener::bind(format!("{host}:{port}")).await?;
    info!("Monitor listening for keepers and operators on {}:{}", host, port);

    loop {
        match listener.accept().await {
            Ok((socket, addr)) => {
                let monitor = monitor.clone();
                // Each connection is served concurrently; the monitor's own
                // locks serialize the decisions.
                tokio::spawn(async move {
                    debug!("Accepted connection from: {}", addr);
                    if let Err(e) = handle_connection(socket, monitor).await {
                        warn!("Error handling connection from {}: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Handles a single connection: requests in, responses out, until the peer
/// hangs up or upgrades into notification streaming.
async fn handle_connection(socket: TcpStream, monitor: Arc<Monitor>) -> Result<()> {
    let mut framed = Framed::new(socket, LinesCodec::new());

    while let Some(result) = framed.next().await {
        let line = match result {
            Ok(line) => line,
            Err(e) => {
                warn!("Error decoding request line: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                let error = MonitorError::ConnectionException(format!("cannot parse request: {e}"));
                framed.send(protocol::error_line(&error)).await?;
                continue;
            }
        };

        match request {
            Request::Listen { channel } => {
                if channel != STATE_CHANNEL {
                    let error = MonitorError::UndefinedObject(format!("channel \"{channel}\""));
                    framed.send(protocol::error_line(&error)).await?;
                    continue;
                }
                framed.send(protocol::ok_line("listening")).await?;
                return stream_notifications(framed, monitor).await;
            }
            other => {
                let response = match dispatch(&monitor, other) {
                    Ok(value) => protocol::ok_line(value),
                    Err(error) => protocol::error_line(&error),
                };
                framed.send(response).await?;
            }
        }
    }
    Ok(())
}

/// Forwards `"state"` notifications to the peer until it disconnects. A
/// listener that lags far enough to lose messages is told so and dropped;
/// it can re-subscribe and re-query `current_state`.
async fn stream_notifications(
    mut framed: Framed<TcpStream, LinesCodec>,
    monitor: Arc<Monitor>,
) -> Result<()> {
    use tokio::sync::broadcast::error::RecvError;

    let mut receiver = monitor.events().subscribe();
    loop {
        // The branch futures are dropped before anything is written, so the
        // send below does not fight the read half for the framed stream.
        let outgoing = tokio::select! {
            notification = receiver.recv() => notification,
            incoming = framed.next() => {
                // The peer is not supposed to talk while listening; EOF or
                // any input ends the subscription.
                if incoming.is_none() {
                    return Ok(());
                }
                continue;
            }
        };

        match outgoing {
            Ok(notification) => {
                let line = serde_json::to_string(&notification)?;
                if framed.send(line).await.is_err() {
                    debug!("Notification listener went away.");
                    return Ok(());
                }
            }
            Err(RecvError::Lagged(missed)) => {
                warn!(
                    "Notification listener lagged, {} messages lost; disconnecting.",
                    missed
                );
                let _ = framed
                    .send(
                        json!({"error": {"class": "connection_exception",
                            "detail": format!("listener lagged, {missed} notifications lost")}})
                        .to_string(),
                    )
                    .await;
                return Ok(());
            }
            Err(RecvError::Closed) => return Ok(()),
        }
    }
}

/// Routes one request to the monitor and serializes the result.
fn dispatch(monitor: &Monitor, request: Request) -> Result<serde_json::Value, MonitorError> {
    match request {
        Request::RegisterNode {
            formation,
            host,
            port,
            dbname,
            name,
            sys_identifier,
            node_id,
            group_id,
            initial_state,
            node_kind,
            candidate_priority,
            replication_quorum,
            cluster_tag,
        } => {
            let result = monitor.register_node(RegisterParams {
                formation,
                host,
                port,
                dbname,
                name,
                sys_identifier,
                desired_node_id: node_id,
                desired_group_id: group_id,
                initial_state,
                node_kind,
                candidate_priority,
                replication_quorum,
                cluster_tag,
            })?;
            Ok(serde_json::to_value(result)?)
        }
        Request::NodeActive {
            formation,
            node_id,
            group_id,
            reported_state,
            pg_is_running,
            tli,
            lsn,
            sync_state,
        } => {
            let result = monitor.node_active(&NodeActiveParams {
                formation,
                node_id,
                group_id,
                reported_state,
                pg_is_running,
                tli,
                lsn,
                sync_state,
            })?;
            Ok(serde_json::to_value(result)?)
        }
        Request::GetPrimary {
            formation,
            group_id,
        } => Ok(serde_json::to_value(
            monitor.get_primary(&formation, group_id)?,
        )?),
        Request::GetNodes {
            formation,
            group_id,
        } => Ok(serde_json::to_value(monitor.get_nodes(&formation, group_id)?)?),
        Request::GetOtherNodes {
            node_id,
            current_state,
        } => Ok(serde_json::to_value(
            monitor.get_other_nodes(node_id, current_state)?,
        )?),
        Request::RemoveNodeByNodeid { node_id, force } => Ok(serde_json::to_value(
            monitor.remove_node_by_nodeid(node_id, force)?,
        )?),
        Request::RemoveNodeByHost { host, port, force } => Ok(serde_json::to_value(
            monitor.remove_node_by_host(&host, port, force)?,
        )?),
        Request::PerformFailover {
            formation,
            group_id,
        } => {
            monitor.perform_failover(&formation, group_id)?;
            Ok(serde_json::Value::Null)
        }
        Request::PerformPromotion { formation, name } => Ok(serde_json::to_value(
            monitor.perform_promotion(&formation, &name)?,
        )?),
        Request::StartMaintenance { node_id } => {
            Ok(serde_json::to_value(monitor.start_maintenance(node_id)?)?)
        }
        Request::StopMaintenance { node_id } => {
            Ok(serde_json::to_value(monitor.stop_maintenance(node_id)?)?)
        }
        Request::SetNodeCandidatePriority {
            formation,
            name,
            candidate_priority,
        } => Ok(serde_json::to_value(monitor.set_node_candidate_priority(
            &formation,
            &name,
            candidate_priority,
        )?)?),
        Request::SetNodeReplicationQuorum {
            formation,
            name,
            replication_quorum,
        } => Ok(serde_json::to_value(monitor.set_node_replication_quorum(
            &formation,
            &name,
            replication_quorum,
        )?)?),
        Request::SetFormationNumberSyncStandbys {
            formation,
            number_sync_standbys,
        } => Ok(serde_json::to_value(
            monitor.set_formation_number_sync_standbys(&formation, number_sync_standbys)?,
        )?),
        Request::UpdateNodeMetadata {
            node_id,
            name,
            host,
            port,
        } => Ok(serde_json::to_value(monitor.update_node_metadata(
            node_id,
            name.as_deref(),
            host.as_deref(),
            port,
        )?)?),
        Request::SynchronousStandbyNames {
            formation,
            group_id,
        } => Ok(serde_json::to_value(
            monitor.synchronous_standby_names(&formation, group_id)?,
        )?),
        Request::CurrentState {
            formation,
            group_id,
        } => Ok(serde_json::to_value(
            monitor.current_state(&formation, group_id)?,
        )?),
        Request::LastEvents {
            formation,
            group_id,
            count,
        } => Ok(serde_json::to_value(monitor.last_events(
            formation.as_deref(),
            group_id,
            count,
        ))?),
        Request::CreateFormation {
            formation,
            kind,
            dbname,
            opt_secondary,
            number_sync_standbys,
        } => Ok(serde_json::to_value(monitor.create_formation(
            &formation,
            kind,
            &dbname,
            opt_secondary,
            number_sync_standbys,
        )?)?),
        Request::DropFormation { formation } => {
            Ok(serde_json::to_value(monitor.drop_formation(&formation)?)?)
        }
        Request::ReportNodeHealth { host, port, health } => Ok(serde_json::to_value(
            monitor.report_node_health(&host, port, health)?,
        )?),
        Request::Metrics => Ok(serde_json::Value::String(metrics::render())),
        Request::Listen { .. } => unreachable!("listen is handled by the connection loop"),
    }
}
