use smol::{
    channel,
    channel::{Receiver, Sender, TryRecvError},
};

use super::{MessageReceiver as TransportReceiver, MessageSender as TransportSender, RecvError, SendError};

/// An in-process, channel-backed message connection. Used by local hosts and
/// by the test suite in place of a real socket.
pub struct MessageChannel;

impl MessageChannel {
    pub fn unbounded() -> (Box<dyn TransportSender>, Box<dyn TransportReceiver>) {
        let (message_sender, message_receiver) = channel::unbounded();
        let message_receiver = MessageChannelReceiver::new(message_receiver);
        (Box::new(message_sender), Box::new(message_receiver))
    }
}

impl TransportSender for Sender<String> {
    fn send(&self, message: &str) -> Result<(), SendError> {
        self.send_blocking(message.to_string()).map_err(|_| SendError)
    }
}

#[derive(Clone)]
struct MessageChannelReceiver {
    receiver: Receiver<String>,
}

impl MessageChannelReceiver {
    fn new(receiver: Receiver<String>) -> Self {
        Self { receiver }
    }
}

impl TransportReceiver for MessageChannelReceiver {
    fn receive(&mut self) -> Result<Option<String>, RecvError> {
        match self.receiver.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(_) => Err(RecvError),
        }
    }
}
