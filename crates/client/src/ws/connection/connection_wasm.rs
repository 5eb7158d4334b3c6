//! WASM/Web-specific WebSocket implementation using web_sys::WebSocket.

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use furioso_shared::RealtimeError;
use futures_channel::oneshot;
use futures_util::StreamExt;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{js_sys, CloseEvent, ErrorEvent, Event, MessageEvent, WebSocket};

use super::{CloseInfo, Connector, Outgoing, Socket, SocketPeer};

/// Opens sockets with the browser's `WebSocket`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserConnector;

#[async_trait(?Send)]
impl Connector for BrowserConnector {
    async fn open(&self, url: &str) -> Result<Socket, RealtimeError> {
        let ws = WebSocket::new(url)
            .map_err(|e| RealtimeError::Transport(format!("Failed to create WebSocket: {:?}", e)))?;

        let (socket, peer) = Socket::pair();
        let SocketPeer { mut outgoing, sink } = peer;

        // Resolved by whichever of open/error/close fires first
        let (opened_tx, opened_rx) = oneshot::channel::<Result<(), String>>();
        let opened_tx = Rc::new(RefCell::new(Some(opened_tx)));

        let on_open_tx = opened_tx.clone();
        let onopen_callback = Closure::wrap(Box::new(move |_: Event| {
            if let Some(tx) = on_open_tx.borrow_mut().take() {
                let _ = tx.send(Ok(()));
            }
        }) as Box<dyn FnMut(Event)>);
        ws.set_onopen(Some(onopen_callback.as_ref().unchecked_ref()));
        onopen_callback.forget();

        let on_error_tx = opened_tx.clone();
        let onerror_callback = Closure::wrap(Box::new(move |_: ErrorEvent| {
            crate::log_error!("WebSocket onerror fired");
            if let Some(tx) = on_error_tx.borrow_mut().take() {
                let _ = tx.send(Err("WebSocket error".to_string()));
            }
        }) as Box<dyn FnMut(ErrorEvent)>);
        ws.set_onerror(Some(onerror_callback.as_ref().unchecked_ref()));
        onerror_callback.forget();

        let message_sink = sink.clone();
        let onmessage_callback = Closure::wrap(Box::new(move |e: MessageEvent| {
            // Binary frames are not part of the protocol
            if let Ok(text) = e.data().dyn_into::<js_sys::JsString>() {
                let text: String = text.into();
                message_sink.push_text(text);
            }
        }) as Box<dyn FnMut(MessageEvent)>);
        ws.set_onmessage(Some(onmessage_callback.as_ref().unchecked_ref()));
        onmessage_callback.forget();

        let close_sink = sink.clone();
        let on_close_tx = opened_tx;
        let onclose_callback = Closure::wrap(Box::new(move |e: CloseEvent| {
            let info = CloseInfo {
                clean: e.was_clean() && e.code() == 1000,
                code: Some(e.code()),
                reason: e.reason(),
            };
            if let Some(tx) = on_close_tx.borrow_mut().take() {
                let _ = tx.send(Err(format!("closed before opening: {}", info)));
            }
            crate::log_info!("WebSocket onclose: {}", info);
            close_sink.close(info);
        }) as Box<dyn FnMut(CloseEvent)>);
        ws.set_onclose(Some(onclose_callback.as_ref().unchecked_ref()));
        onclose_callback.forget();

        match opened_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => return Err(RealtimeError::Transport(reason)),
            Err(_) => return Err(RealtimeError::Transport("socket dropped".to_string())),
        }

        // Send task: drains what the client queued
        spawn_local(async move {
            while let Some(out) = outgoing.next().await {
                match out {
                    Outgoing::Text(text) => {
                        // readyState 1 = OPEN
                        if ws.ready_state() != 1 {
                            crate::log_info!("WebSocket no longer open, stopping send task");
                            break;
                        }
                        if let Err(e) = ws.send_with_str(&text) {
                            crate::log_error!("Send failed: {:?}", e);
                        }
                    }
                    Outgoing::Close => {
                        let _ = ws.close();
                        break;
                    }
                }
            }
        });

        Ok(socket)
    }
}
