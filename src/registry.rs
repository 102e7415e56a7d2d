//! Registry of live client connections: topic subscriptions, advisory locks
//! and message delivery.

use std::{collections::HashSet, fmt};

use smallvec::SmallVec;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
   Result,
   error::{DeliveryError, Error},
   protocol::ServerMessage,
};

/// Outbound queue of one connection. A writer task drains it into the
/// transport, so messages reach each client in send order.
pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
   fn generate() -> Self {
      Self(Uuid::new_v4().to_string())
   }

   pub fn as_str(&self) -> &str {
      &self.0
   }
}

impl fmt::Display for ConnectionId {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(&self.0)
   }
}

/// Exclusive claim over a topic (a chat) for the duration of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lock {
   pub topic:      String,
   pub request_id: String,
}

pub struct Connection {
   id:     ConnectionId,
   topics: HashSet<String>,
   locks:  SmallVec<[Lock; 2]>,
   outbox: Outbox,
}

impl Connection {
   pub fn id(&self) -> &ConnectionId {
      &self.id
   }

   pub fn topics(&self) -> &HashSet<String> {
      &self.topics
   }

   pub fn locks(&self) -> &[Lock] {
      &self.locks
   }

   fn send(&self, msg: ServerMessage) -> Result<(), DeliveryError> {
      self
         .outbox
         .send(msg)
         .map_err(|_| DeliveryError::Closed(self.id.to_string()))
   }
}

#[derive(Default)]
pub struct ConnectionRegistry {
   connections: Vec<Connection>,
}

impl ConnectionRegistry {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn len(&self) -> usize {
      self.connections.len()
   }

   pub fn is_empty(&self) -> bool {
      self.connections.is_empty()
   }

   pub fn ids(&self) -> impl Iterator<Item = &ConnectionId> {
      self.connections.iter().map(Connection::id)
   }

   pub fn get(&self, id: &ConnectionId) -> Option<&Connection> {
      self.connections.iter().find(|c| &c.id == id)
   }

   fn get_mut(&mut self, id: &ConnectionId) -> Result<&mut Connection> {
      self
         .connections
         .iter_mut()
         .find(|c| &c.id == id)
         .ok_or_else(|| DeliveryError::UnknownConnection(id.to_string()).into())
   }

   /// Registers a new connection whose messages go to `outbox`.
   pub fn connect(&mut self, outbox: Outbox) -> ConnectionId {
      let id = ConnectionId::generate();
      self.connections.push(Connection {
         id: id.clone(),
         topics: HashSet::new(),
         locks: SmallVec::new(),
         outbox,
      });
      tracing::info!("connection {id} connected ({} active)", self.connections.len());
      id
   }

   /// Removes a connection and releases every lock it held. Returns `false` if
   /// the connection was not registered.
   pub fn disconnect(&mut self, id: &ConnectionId) -> bool {
      let mut pending = vec![id.clone()];
      let mut removed_requested = false;

      while let Some(next) = pending.pop() {
         let Some(idx) = self.connections.iter().position(|c| c.id == next) else {
            continue;
         };
         let connection = self.connections.remove(idx);
         removed_requested |= &next == id;
         tracing::info!("connection {next} disconnected ({} active)", self.connections.len());

         for lock in connection.locks {
            let released = ServerMessage::LockReleased {
               chat_id:    lock.topic.clone(),
               request_id: lock.request_id,
            };
            for other in &self.connections {
               if other.topics.contains(&lock.topic) && other.send(released.clone()).is_err() {
                  pending.push(other.id.clone());
               }
            }
         }
      }

      removed_requested
   }

   /// Sends to a single connection. A closed transport disconnects it.
   pub fn send_to(&mut self, id: &ConnectionId, msg: ServerMessage) -> Result<()> {
      let result = match self.get(id) {
         Some(connection) => connection.send(msg),
         None => Err(DeliveryError::UnknownConnection(id.to_string())),
      };
      if let Err(e) = result {
         tracing::debug!("delivery to {id} failed: {e}");
         if matches!(e, DeliveryError::Closed(_)) {
            self.disconnect(id);
         }
         return Err(e.into());
      }
      Ok(())
   }

   /// Sends to every connection subscribed to `topic`. Returns the number
   /// of successful deliveries.
   pub fn send_to_topic(&mut self, msg: &ServerMessage, topic: &str) -> usize {
      self.deliver(msg, |c| c.topics.contains(topic))
   }

   /// Sends to every active connection. Returns the number of successful
   /// deliveries.
   pub fn broadcast(&mut self, msg: &ServerMessage) -> usize {
      self.deliver(msg, |_| true)
   }

   fn deliver(&mut self, msg: &ServerMessage, filter: impl Fn(&Connection) -> bool) -> usize {
      let mut delivered = 0;
      let mut failed = Vec::new();

      for connection in self.connections.iter().filter(|c| filter(c)) {
         match connection.send(msg.clone()) {
            Ok(()) => delivered += 1,
            Err(e) => {
               tracing::warn!("failed to deliver {}: {e}", msg.type_name());
               failed.push(connection.id.clone());
            },
         }
      }

      for id in &failed {
         self.disconnect(id);
      }
      delivered
   }

   pub fn open_topic(&mut self, id: &ConnectionId, topic: &str) -> Result<()> {
      self.get_mut(id)?.topics.insert(topic.to_string());
      Ok(())
   }

   pub fn close_topic(&mut self, id: &ConnectionId, topic: &str) -> Result<()> {
      self.get_mut(id)?.topics.remove(topic);
      Ok(())
   }

   /// Records that `id` holds the lock on `topic`. Re-acquiring a lock the
   /// connection already holds is a no-op.
   pub fn acquire_lock(&mut self, id: &ConnectionId, topic: &str, request_id: &str) -> Result<()> {
      if let Some((holder, lock)) = self.lock_holder(topic) {
         if holder != id || lock.request_id != request_id {
            return Err(Error::LockHeld {
               topic:      topic.to_string(),
               request_id: lock.request_id.clone(),
            });
         }
         return Ok(());
      }

      self.get_mut(id)?.locks.push(Lock {
         topic:      topic.to_string(),
         request_id: request_id.to_string(),
      });
      Ok(())
   }

   /// Drops the lock if `id` holds it for `request_id`. Returns whether a lock
   /// was released.
   pub fn release_lock(&mut self, id: &ConnectionId, topic: &str, request_id: &str) -> Result<bool> {
      let connection = self.get_mut(id)?;
      let before = connection.locks.len();
      connection
         .locks
         .retain(|lock| !(lock.topic == topic && lock.request_id == request_id));
      Ok(connection.locks.len() != before)
   }

   pub fn lock_holder(&self, topic: &str) -> Option<(&ConnectionId, &Lock)> {
      self.connections.iter().find_map(|c| {
         c.locks
            .iter()
            .find(|lock| lock.topic == topic)
            .map(|lock| (&c.id, lock))
      })
   }
}
