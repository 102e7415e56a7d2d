//! WebSocket endpoint: one reader loop and one writer task per client.

use axum::{
   extract::{
      State, WebSocketUpgrade,
      ws::{Message, WebSocket},
   },
   response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::{
   console::ConsoleHandle,
   protocol::{ClientMessage, ServerMessage},
   server::AppState,
};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
   ws.on_upgrade(move |socket| handle_socket(socket, state.console))
}

async fn handle_socket(socket: WebSocket, console: ConsoleHandle) {
   let (mut ws_tx, mut ws_rx) = socket.split();
   let (outbox, mut outbox_rx) = mpsc::unbounded_channel::<ServerMessage>();

   let id = match console.connect(outbox).await {
      Ok(id) => id,
      Err(e) => {
         tracing::warn!("rejecting websocket client: {e}");
         return;
      },
   };

   let writer_id = id.clone();
   let send_task = tokio::spawn(async move {
      while let Some(msg) = outbox_rx.recv().await {
         let json = match serde_json::to_string(&msg) {
            Ok(json) => json,
            Err(e) => {
               tracing::error!("failed to serialize {}: {e}", msg.type_name());
               continue;
            },
         };
         if ws_tx.send(Message::Text(json.into())).await.is_err() {
            tracing::debug!("websocket send to {writer_id} failed, client gone");
            break;
         }
      }
   });

   while let Some(result) = ws_rx.next().await {
      let text = match result {
         Ok(Message::Text(text)) => text,
         Ok(Message::Close(_)) => break,
         Ok(_) => continue,
         Err(e) => {
            tracing::debug!("websocket error on {id}: {e}");
            break;
         },
      };

      let queued = match serde_json::from_str::<ClientMessage>(text.as_str()) {
         Ok(message) => console.client_message(id.clone(), message),
         Err(e) => console.invalid_message(id.clone(), format!("invalid message: {e}")),
      };
      if queued.is_err() {
         break;
      }
   }

   console.disconnect(id);
   send_task.abort();
}
