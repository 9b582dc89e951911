//! Tokio driver for a single router
//!
//! [`spawn_node`] moves a [`CarpRouter`] into its own task. Commands reach it
//! over a bounded channel, timers are sleeping tasks that post back into the
//! same channel, and everything the router emits leaves through the unbounded
//! receivers in [`NodeIo`]. Transmissions are released once their requested
//! delay has elapsed; the caller plays the part of the link layer.

use aquamesh_protocol::{NodeAddress, Packet};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::debug;

use crate::env::{Outbox, TimerEvent, Transmission};
use crate::error::{Result, RoutingError};
use crate::router::{CarpRouter, RouterStats, RoutingEvent};

const COMMAND_CHANNEL_SIZE: usize = 256;

enum Input {
    Send {
        destination: NodeAddress,
        payload: Vec<u8>,
        reply: oneshot::Sender<Result<u32>>,
    },
    Receive(Packet),
    StartDiscovery,
    Stats(oneshot::Sender<RouterStats>),
    Timer(TimerEvent),
    Shutdown,
}

/// Outputs of a running node
pub struct NodeIo {
    /// Packets for the link layer, released after their jitter
    pub transmissions: mpsc::UnboundedReceiver<Transmission>,
    /// Packets delivered to the application
    pub deliveries: mpsc::UnboundedReceiver<Packet>,
    pub events: mpsc::UnboundedReceiver<RoutingEvent>,
}

/// Cloneable handle to a running node
#[derive(Clone)]
pub struct NodeHandle {
    address: NodeAddress,
    tx: mpsc::Sender<Input>,
}

impl NodeHandle {
    pub fn address(&self) -> NodeAddress {
        self.address
    }

    /// Originate a data packet; returns its uid
    pub async fn send_data(&self, destination: NodeAddress, payload: Vec<u8>) -> Result<u32> {
        let (reply, response) = oneshot::channel();
        self.submit(Input::Send {
            destination,
            payload,
            reply,
        })
        .await?;
        response.await.map_err(|_| RoutingError::RuntimeStopped)?
    }

    /// Hand a packet heard on the link to the node
    pub async fn receive(&self, packet: Packet) -> Result<()> {
        self.submit(Input::Receive(packet)).await
    }

    pub async fn start_discovery(&self) -> Result<()> {
        self.submit(Input::StartDiscovery).await
    }

    pub async fn stats(&self) -> Result<RouterStats> {
        let (reply, response) = oneshot::channel();
        self.submit(Input::Stats(reply)).await?;
        response.await.map_err(|_| RoutingError::RuntimeStopped)
    }

    /// Stop the node task. The router is returned by the task's join handle.
    pub async fn shutdown(&self) -> Result<()> {
        self.submit(Input::Shutdown).await
    }

    async fn submit(&self, input: Input) -> Result<()> {
        self.tx
            .send(input)
            .await
            .map_err(|_| RoutingError::RuntimeStopped)
    }
}

struct Outputs {
    transmissions: mpsc::UnboundedSender<Transmission>,
    deliveries: mpsc::UnboundedSender<Packet>,
    events: mpsc::UnboundedSender<RoutingEvent>,
}

/// Run `router` on the current tokio runtime
///
/// The task ends on [`NodeHandle::shutdown`] or once every handle is dropped,
/// and yields the router back.
pub fn spawn_node(router: CarpRouter) -> (NodeHandle, NodeIo, JoinHandle<CarpRouter>) {
    let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
    let (transmissions_tx, transmissions) = mpsc::unbounded_channel();
    let (deliveries_tx, deliveries) = mpsc::unbounded_channel();
    let (events_tx, events) = mpsc::unbounded_channel();

    let handle = NodeHandle {
        address: router.local_address(),
        tx: tx.clone(),
    };
    let timers = tx.downgrade();
    drop(tx);

    let outputs = Outputs {
        transmissions: transmissions_tx,
        deliveries: deliveries_tx,
        events: events_tx,
    };
    let task = tokio::spawn(run_node(router, rx, timers, outputs));

    (
        handle,
        NodeIo {
            transmissions,
            deliveries,
            events,
        },
        task,
    )
}

async fn run_node(
    mut router: CarpRouter,
    mut rx: mpsc::Receiver<Input>,
    timers: mpsc::WeakSender<Input>,
    outputs: Outputs,
) -> CarpRouter {
    let started = Instant::now();
    let mut outbox = Outbox::new(Duration::ZERO);
    debug!("Node {} task started", router.local_address());

    while let Some(input) = rx.recv().await {
        outbox.set_now(started.elapsed());

        match input {
            Input::Send {
                destination,
                payload,
                reply,
            } => {
                let result = router.send_data(&mut outbox, destination, payload);
                let _ = reply.send(result);
            }
            Input::Receive(packet) => router.on_receive(&mut outbox, packet),
            Input::StartDiscovery => router.start_discovery(&mut outbox),
            Input::Stats(reply) => {
                let _ = reply.send(router.stats().clone());
            }
            Input::Timer(event) => router.on_timer(&mut outbox, event),
            Input::Shutdown => break,
        }

        flush(&mut outbox, &mut router, &timers, &outputs);
    }

    debug!("Node {} task stopped", router.local_address());
    router
}

fn flush(
    outbox: &mut Outbox,
    router: &mut CarpRouter,
    timers: &mpsc::WeakSender<Input>,
    outputs: &Outputs,
) {
    for timer in outbox.take_timers() {
        let timers = timers.clone();
        tokio::spawn(async move {
            time::sleep(timer.delay).await;
            if let Some(tx) = timers.upgrade() {
                let _ = tx.send(Input::Timer(timer.event)).await;
            }
        });
    }

    for transmission in outbox.take_transmissions() {
        if transmission.delay.is_zero() {
            let _ = outputs.transmissions.send(transmission);
        } else {
            let link = outputs.transmissions.clone();
            tokio::spawn(async move {
                time::sleep(transmission.delay).await;
                let _ = link.send(transmission);
            });
        }
    }

    for packet in outbox.take_deliveries() {
        let _ = outputs.deliveries.send(packet);
    }

    for event in router.drain_events() {
        let _ = outputs.events.send(event);
    }
}
