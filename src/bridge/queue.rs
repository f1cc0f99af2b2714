//! Queue pair between the control thread and the real-time thread
//!
//! Both directions are unbounded FIFOs, so posting never blocks the
//! producer. Only [`ControlEndpoint::send`] and
//! [`ControlEndpoint::shutdown`] wait for the other side.

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::bridge::message::{ControlMessage, SinkMessage, ThreadMessage};
use crate::error::BridgeError;

/// Create a connected pair of endpoints
pub fn thread_mq() -> (ControlEndpoint, RtEndpoint) {
    let (inq_tx, inq_rx) = unbounded();
    let (outq_tx, outq_rx) = unbounded();

    (
        ControlEndpoint {
            inq: inq_tx,
            outq: outq_rx,
        },
        RtEndpoint {
            inq: inq_rx,
            outq: outq_tx,
        },
    )
}

/// Control-thread side of the bridge
#[derive(Clone)]
pub struct ControlEndpoint {
    inq: Sender<ThreadMessage>,
    outq: Receiver<ControlMessage>,
}

impl ControlEndpoint {
    /// Queue a sink message for the real-time thread
    pub fn post(&self, msg: SinkMessage) -> Result<(), BridgeError> {
        self.inq
            .send(ThreadMessage::Sink(msg))
            .map_err(|_| BridgeError::Disconnected)
    }

    /// Queue a message carrying a reply channel and wait for the answer
    pub fn send<T>(
        &self,
        make: impl FnOnce(Sender<T>) -> SinkMessage,
        timeout: Duration,
    ) -> Result<T, BridgeError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.post(make(reply_tx))?;

        reply_rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => BridgeError::Timeout,
            RecvTimeoutError::Disconnected => BridgeError::Disconnected,
        })
    }

    /// Ask the real-time thread to exit and wait until it has
    ///
    /// A thread that is already gone counts as shut down.
    pub fn shutdown(&self) -> Result<(), BridgeError> {
        let (ack_tx, ack_rx) = bounded(1);
        self.inq
            .send(ThreadMessage::Shutdown { ack: Some(ack_tx) })
            .map_err(|_| BridgeError::Disconnected)?;

        // Err means the thread dropped the ack while exiting
        let _ = ack_rx.recv();
        Ok(())
    }

    /// Next pending message from the real-time thread, if any
    pub fn try_recv(&self) -> Option<ControlMessage> {
        self.outq.try_recv().ok()
    }

    /// Receiver for use in `select!`
    pub fn receiver(&self) -> &Receiver<ControlMessage> {
        &self.outq
    }
}

/// Real-time side of the bridge
pub struct RtEndpoint {
    inq: Receiver<ThreadMessage>,
    outq: Sender<ControlMessage>,
}

impl RtEndpoint {
    pub fn split(self) -> (Receiver<ThreadMessage>, Sender<ControlMessage>) {
        (self.inq, self.outq)
    }
}

/// Pending acknowledgement of a shutdown request
#[derive(Debug, Default)]
pub struct ShutdownAck(Option<Sender<()>>);

impl ShutdownAck {
    pub fn new(ack: Option<Sender<()>>) -> Self {
        Self(ack)
    }

    /// Signal the waiting control thread
    pub fn complete(mut self) {
        if let Some(ack) = self.0.take() {
            let _ = ack.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::host::HostMessage;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let (control, rt) = thread_mq();
        let (inbox, _outbox) = rt.split();

        control.post(SinkMessage::RipSocket).unwrap();
        control.post(SinkMessage::ConnectionLost).unwrap();
        control
            .post(SinkMessage::Host(HostMessage::Custom { code: 7, offset: 0 }))
            .unwrap();

        let names: Vec<_> = inbox
            .try_iter()
            .map(|msg| match msg {
                ThreadMessage::Sink(m) => m.name(),
                ThreadMessage::Shutdown { .. } => "shutdown",
            })
            .collect();
        assert_eq!(names, ["rip-socket", "connection-lost", "host"]);
    }

    #[test]
    fn test_send_waits_for_reply() {
        let (control, rt) = thread_mq();
        let (inbox, _outbox) = rt.split();

        let responder = thread::spawn(move || {
            if let Ok(ThreadMessage::Sink(SinkMessage::GetLatency { reply })) = inbox.recv() {
                reply.send(Duration::from_millis(42)).unwrap();
            }
        });

        let latency = control
            .send(|reply| SinkMessage::GetLatency { reply }, Duration::from_secs(5))
            .unwrap();
        assert_eq!(latency, Duration::from_millis(42));
        responder.join().unwrap();
    }

    #[test]
    fn test_send_times_out() {
        let (control, rt) = thread_mq();
        let result = control.send(
            |reply| SinkMessage::GetLatency { reply },
            Duration::from_millis(10),
        );
        assert_eq!(result, Err(BridgeError::Timeout));
        drop(rt);
    }

    #[test]
    fn test_shutdown_after_thread_exit() {
        let (control, rt) = thread_mq();
        drop(rt);
        assert_eq!(control.shutdown(), Err(BridgeError::Disconnected));
        assert!(control.post(SinkMessage::RipSocket).is_err());
    }

    #[test]
    fn test_shutdown_is_acknowledged() {
        let (control, rt) = thread_mq();
        let (inbox, _outbox) = rt.split();

        let worker = thread::spawn(move || loop {
            match inbox.recv() {
                Ok(ThreadMessage::Shutdown { ack }) => {
                    ShutdownAck::new(ack).complete();
                    return true;
                }
                Ok(_) => continue,
                Err(_) => return false,
            }
        });

        control.post(SinkMessage::RipSocket).unwrap();
        control.shutdown().unwrap();
        assert!(worker.join().unwrap());
    }
}
