//! Shared fakes for the integration tests: an in-memory channel, a
//! scriptable transfer window, and a client-side handshake driver.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use num_bigint::BigUint;
use prost::Message;
use tokio::sync::mpsc;

use remlink::crypto::hash::{GenericHash, HashType};
use remlink::crypto::keys::random_bytes;
use remlink::crypto::srp;
use remlink::crypto::{KeyPair, MessageDecryptor, MessageEncryptor};
use remlink::net::{Channel, ChannelError, ChannelEvent};
use remlink::proto;
use remlink::transfer::policy::{ErrorAction, ErrorKind, TransferError};
use remlink::transfer::{TransferControl, TransferWindow};

// ---------------------------------------------------------------------------
// Fake channel

#[derive(Default)]
pub struct ChannelState {
    pub encryptors: Vec<Box<dyn MessageEncryptor>>,
    pub decryptors: Vec<Box<dyn MessageDecryptor>>,
    pub paused: bool,
    pub resumed: bool,
}

/// In-memory [`Channel`]: messages are recorded, every `send` immediately
/// reports a write completion, and the test side injects inbound events
/// through the handle.
pub struct FakeChannel {
    state: Arc<Mutex<ChannelState>>,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    event_tx: mpsc::UnboundedSender<ChannelEvent>,
    sent_tx: mpsc::UnboundedSender<Vec<u8>>,
}

pub struct FakeChannelHandle {
    state: Arc<Mutex<ChannelState>>,
    event_tx: mpsc::UnboundedSender<ChannelEvent>,
    sent_rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl FakeChannel {
    pub fn new() -> (FakeChannel, FakeChannelHandle) {
        let state = Arc::new(Mutex::new(ChannelState::default()));
        let (event_tx, events) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();

        (
            FakeChannel {
                state: state.clone(),
                events,
                event_tx: event_tx.clone(),
                sent_tx,
            },
            FakeChannelHandle {
                state,
                event_tx,
                sent_rx,
            },
        )
    }
}

#[async_trait]
impl Channel for FakeChannel {
    fn send(&mut self, message: Vec<u8>) {
        let _ = self.sent_tx.send(message);
        let _ = self
            .event_tx
            .send(ChannelEvent::MessageWritten { pending: 0 });
    }

    fn pause(&mut self) {
        self.state.lock().unwrap().paused = true;
    }

    fn resume(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.paused = false;
        state.resumed = true;
    }

    fn set_encryptor(&mut self, encryptor: Box<dyn MessageEncryptor>) {
        self.state.lock().unwrap().encryptors.push(encryptor);
    }

    fn set_decryptor(&mut self, decryptor: Box<dyn MessageDecryptor>) {
        self.state.lock().unwrap().decryptors.push(decryptor);
    }

    fn peer_address(&self) -> String {
        "203.0.113.7:8900".to_string()
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }
}

impl FakeChannelHandle {
    pub fn deliver(&self, message: Vec<u8>) {
        let _ = self.event_tx.send(ChannelEvent::MessageReceived(message));
    }

    pub fn deliver_message(&self, message: &impl Message) {
        self.deliver(message.encode_to_vec());
    }

    pub fn disconnect(&self, error: ChannelError) {
        let _ = self.event_tx.send(ChannelEvent::Disconnected(error));
    }

    pub async fn next_sent(&mut self) -> Vec<u8> {
        self.sent_rx.recv().await.expect("channel destroyed")
    }

    pub async fn next_message<M: Message + Default>(&mut self) -> M {
        let bytes = self.next_sent().await;
        M::decode(bytes.as_slice()).expect("sent message decodes")
    }

    pub fn try_next_sent(&mut self) -> Option<Vec<u8>> {
        self.sent_rx.try_recv().ok()
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().unwrap().paused
    }

    pub fn was_resumed(&self) -> bool {
        self.state.lock().unwrap().resumed
    }

    pub fn installed_cipher_pairs(&self) -> usize {
        self.state.lock().unwrap().encryptors.len()
    }

    pub fn take_ciphers(
        &self,
    ) -> (Vec<Box<dyn MessageEncryptor>>, Vec<Box<dyn MessageDecryptor>>) {
        let mut state = self.state.lock().unwrap();
        (
            std::mem::take(&mut state.encryptors),
            std::mem::take(&mut state.decryptors),
        )
    }
}

// ---------------------------------------------------------------------------
// Client-side handshake driver

pub struct SrpExchange {
    pub server_hello: proto::ServerHello,
    pub key_exchange: proto::SrpServerKeyExchange,
    pub challenge: proto::SessionChallenge,
    /// The session key as the client derives it.
    pub session_key: Vec<u8>,
}

/// Run the client side of an SRP handshake up to the session challenge.
/// `server_public` enables the key-agreement layer; `password` is what the
/// client believes the password is.
pub async fn drive_srp_to_challenge(
    handle: &mut FakeChannelHandle,
    username: &str,
    password: &[u8],
    server_public: Option<[u8; 32]>,
) -> SrpExchange {
    let client_key_pair = KeyPair::generate();

    handle.deliver_message(&proto::ClientHello {
        encryption: proto::ENCRYPTION_AES256_GCM | proto::ENCRYPTION_CHACHA20_POLY1305,
        identify: proto::Identify::Srp as i32,
        iv: random_bytes(12),
        public_key: client_key_pair.public_key().to_vec(),
    });
    let server_hello: proto::ServerHello = handle.next_message().await;

    let agreement_key = server_public.map(|server_public| {
        let shared = client_key_pair
            .session_key(&server_public)
            .expect("key agreement");
        GenericHash::hash(HashType::Blake2s256, &shared)
    });

    handle.deliver_message(&proto::SrpIdentify {
        username: username.to_string(),
    });
    let key_exchange: proto::SrpServerKeyExchange = handle.next_message().await;

    let n = BigUint::from_bytes_be(&key_exchange.number);
    let g = BigUint::from_bytes_be(&key_exchange.generator);
    let b_pub = BigUint::from_bytes_be(&key_exchange.b);

    let a = BigUint::from_bytes_be(&random_bytes(128));
    let a_pub = srp::calc_a_pub(&a, &n, &g);
    let u = srp::calc_u(&a_pub, &b_pub, &n).expect("valid u");
    let x = srp::calc_x(username.as_bytes(), password, &key_exchange.salt);
    let srp_key = srp::calc_client_key(&b_pub, &a, &x, &u, &n, &g).to_bytes_be();

    handle.deliver_message(&proto::SrpClientKeyExchange {
        a: a_pub.to_bytes_be(),
        iv: random_bytes(12),
    });
    let challenge: proto::SessionChallenge = handle.next_message().await;

    let mut hash = GenericHash::new(HashType::Blake2s256);
    if let Some(agreement_key) = &agreement_key {
        hash.add_data(agreement_key);
    }
    hash.add_data(&srp_key);

    SrpExchange {
        server_hello,
        key_exchange,
        challenge,
        session_key: hash.result(),
    }
}

// ---------------------------------------------------------------------------
// Fake transfer window

#[derive(Debug, Clone, PartialEq)]
pub enum WindowEvent {
    Started,
    Stopped,
    CurrentItem { source: String, target: String },
    Progress { total: u32, task: u32 },
    Error { kind: ErrorKind, actions: u32 },
}

/// Records every window call and answers error prompts from a script.
#[derive(Default)]
pub struct FakeWindow {
    events: Mutex<Vec<WindowEvent>>,
    control: Mutex<Option<TransferControl>>,
    responses: Mutex<HashMap<ErrorKind, ErrorAction>>,
    stop_on_progress: AtomicBool,
}

impl FakeWindow {
    pub fn new() -> Arc<FakeWindow> {
        Arc::new(FakeWindow::default())
    }

    /// Answer future prompts of `kind` with `action`.
    pub fn respond_with(&self, kind: ErrorKind, action: ErrorAction) {
        self.responses.lock().unwrap().insert(kind, action);
    }

    /// Request cancellation from inside the first progress callback.
    pub fn stop_on_first_progress(&self) {
        self.stop_on_progress.store(true, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<WindowEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn progress_events(&self) -> Vec<(u32, u32)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                WindowEvent::Progress { total, task } => Some((total, task)),
                _ => None,
            })
            .collect()
    }

    pub fn prompt_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, WindowEvent::Error { .. }))
            .count()
    }

    pub fn stop_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, WindowEvent::Stopped))
            .count()
    }

    fn push(&self, event: WindowEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn control(&self) -> TransferControl {
        self.control
            .lock()
            .unwrap()
            .clone()
            .expect("window started")
    }
}

impl TransferWindow for FakeWindow {
    fn start(&self, control: TransferControl) {
        *self.control.lock().unwrap() = Some(control);
        self.push(WindowEvent::Started);
    }

    fn stop(&self) {
        self.push(WindowEvent::Stopped);
    }

    fn set_current_item(&self, source_path: &str, target_path: &str) {
        self.push(WindowEvent::CurrentItem {
            source: source_path.to_string(),
            target: target_path.to_string(),
        });
    }

    fn set_current_progress(&self, total_percentage: u32, task_percentage: u32) {
        self.push(WindowEvent::Progress {
            total: total_percentage,
            task: task_percentage,
        });
        if self.stop_on_progress.swap(false, Ordering::SeqCst) {
            self.control().stop();
        }
    }

    fn error_occurred(&self, error: &TransferError) {
        self.push(WindowEvent::Error {
            kind: error.kind(),
            actions: error.available_actions(),
        });

        let scripted = self.responses.lock().unwrap().get(&error.kind()).copied();
        if let Some(action) = scripted {
            self.control().set_action(error.kind(), action);
        }
    }
}
