//! Server-side authentication state machine.
//!
//! Negotiates an encrypted session over a freshly accepted channel: X25519
//! key agreement, SRP-6a (or anonymous) identification, bulk-cipher
//! selection, and finally a session-type capability exchange. The whole
//! handshake is bounded by a single 60-second deadline. Exactly one
//! terminal state is reported; on success the channel (with ciphers
//! installed) is handed back to the caller, on failure it is destroyed.

use std::sync::Arc;
use std::time::Duration;

use num_bigint::BigUint;
use num_traits::Zero;
use prost::Message;
use tokio::time::sleep;
use zeroize::Zeroizing;

use crate::crypto::cipher::MessageCipher;
use crate::crypto::hash::{GenericHash, HashType};
use crate::crypto::keys::random_bytes;
use crate::crypto::{cpu, srp, KeyPair, IV_SIZE};
use crate::net::channel::{Channel, ChannelEvent};
use crate::net::users::UserList;
use crate::proto;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(60);
/// SRP ephemeral secret size: 128 bytes, 1024 bits.
const SRP_SECRET_SIZE: usize = 128;

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Stopped,
    Pending,
    Success,
    Failed,
}

// Which message or write-completion the machine expects next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InternalState {
    ReadClientHello,
    SendServerHello,
    ReadIdentify,
    SendServerKeyExchange,
    ReadClientKeyExchange,
    SendSessionChallenge,
    ReadSessionResponse,
}

/// Whether clients may identify anonymously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnonymousAccess {
    Enable,
    Disable,
}

enum Wake {
    Timeout,
    Event(Option<ChannelEvent>),
}

/// Drives the handshake for one inbound connection.
pub struct ServerAuthenticator {
    state: State,
    internal_state: InternalState,
    anonymous_access: AnonymousAccess,
    key_pair: Option<KeyPair>,
    hardware_aes: bool,
    session_types: u32,

    channel: Option<Box<dyn Channel>>,
    user_list: Option<Arc<UserList>>,

    identify: proto::Identify,
    encryption: u32,
    encrypt_iv: Vec<u8>,
    decrypt_iv: Vec<u8>,
    session_key: Zeroizing<Vec<u8>>,

    // SRP exchange state.
    n: BigUint,
    g: BigUint,
    salt: Vec<u8>,
    v: BigUint,
    b: BigUint,
    b_pub: BigUint,
    a_pub: BigUint,

    user_name: String,
    peer_version: proto::Version,
    session_type: u32,
}

impl ServerAuthenticator {
    pub fn new() -> ServerAuthenticator {
        ServerAuthenticator {
            state: State::Stopped,
            internal_state: InternalState::ReadClientHello,
            anonymous_access: AnonymousAccess::Disable,
            key_pair: None,
            hardware_aes: cpu::has_hardware_aes(),
            session_types: 0,
            channel: None,
            user_list: None,
            identify: proto::Identify::Srp,
            encryption: 0,
            encrypt_iv: Vec::new(),
            decrypt_iv: Vec::new(),
            session_key: Zeroizing::new(Vec::new()),
            n: BigUint::zero(),
            g: BigUint::zero(),
            salt: Vec::new(),
            v: BigUint::zero(),
            b: BigUint::zero(),
            b_pub: BigUint::zero(),
            a_pub: BigUint::zero(),
            user_name: String::new(),
            peer_version: proto::Version::default(),
            session_type: 0,
        }
    }

    /// Install the host's X25519 private key. Must be called before
    /// [`authenticate`](Self::authenticate).
    pub fn set_private_key(&mut self, private_key: &[u8]) -> bool {
        if self.state != State::Stopped {
            return false;
        }

        if private_key.is_empty() {
            tracing::error!("an empty private key is not valid");
            return false;
        }

        let key_pair = match KeyPair::from_private_key(private_key) {
            Ok(key_pair) => key_pair,
            Err(error) => {
                tracing::error!("failed to load private key: {}", error);
                return false;
            }
        };

        self.key_pair = Some(key_pair);
        self.encrypt_iv = random_bytes(IV_SIZE);
        true
    }

    /// Allow or forbid anonymous identification. Enabling requires an
    /// installed private key and at least one permitted session type.
    pub fn set_anonymous_access(&mut self, access: AnonymousAccess, session_types: u32) -> bool {
        if self.state != State::Stopped {
            return false;
        }

        match access {
            AnonymousAccess::Enable => {
                if self.key_pair.is_none() {
                    tracing::error!("anonymous access requires an installed private key");
                    return false;
                }
                if session_types == 0 {
                    tracing::error!("anonymous access requires at least one session type");
                    return false;
                }
                self.session_types = session_types;
            }
            AnonymousAccess::Disable => {
                self.session_types = 0;
            }
        }

        self.anonymous_access = access;
        true
    }

    /// Override the hardware-AES answer cached at construction. Exists so
    /// embedders (and tests) can force either cipher-selection branch.
    pub fn set_hardware_aes(&mut self, enabled: bool) -> bool {
        if self.state != State::Stopped {
            return false;
        }
        self.hardware_aes = enabled;
        true
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// The session type the client chose; meaningful only after success.
    pub fn session_type(&self) -> u32 {
        self.session_type
    }

    pub fn peer_version(&self) -> &proto::Version {
        &self.peer_version
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// Hand the authenticated channel to the caller. Only available after
    /// success; a failed handshake destroys the channel.
    pub fn take_channel(&mut self) -> Option<Box<dyn Channel>> {
        if self.state != State::Success {
            return None;
        }
        self.channel.take()
    }

    /// Run the handshake to completion. Resolves exactly once with the
    /// terminal state.
    pub async fn authenticate(
        &mut self,
        channel: Box<dyn Channel>,
        user_list: Arc<UserList>,
    ) -> State {
        if self.state != State::Stopped {
            tracing::error!("trying to start an already running authenticator");
            return self.state;
        }

        self.channel = Some(channel);
        self.user_list = Some(user_list);
        self.state = State::Pending;

        match self.anonymous_access {
            AnonymousAccess::Enable => {
                // Anonymous access needs a key pair to encrypt with and at
                // least one session to offer.
                if self.key_pair.is_none() || self.session_types == 0 {
                    self.fail("anonymous access is misconfigured");
                    return self.state;
                }
            }
            AnonymousAccess::Disable => {
                // Sessions are granted per user; none may be preconfigured.
                if self.session_types != 0 {
                    self.fail("unexpected preconfigured session types");
                    return self.state;
                }
            }
        }

        if let Some(channel) = self.channel.as_mut() {
            channel.resume();
            tracing::info!("authentication started for {}", channel.peer_address());
        }

        let deadline = sleep(HANDSHAKE_TIMEOUT);
        tokio::pin!(deadline);

        while self.state == State::Pending {
            let wake = {
                let channel = match self.channel.as_mut() {
                    Some(channel) => channel,
                    None => break,
                };
                tokio::select! {
                    _ = &mut deadline => Wake::Timeout,
                    event = channel.next_event() => Wake::Event(event),
                }
            };

            match wake {
                Wake::Timeout => self.fail("handshake timed out"),
                Wake::Event(None) => self.fail("channel is gone"),
                Wake::Event(Some(ChannelEvent::MessageReceived(buffer))) => {
                    self.on_message_received(&buffer);
                }
                Wake::Event(Some(ChannelEvent::MessageWritten { pending })) => {
                    self.on_message_written(pending);
                }
                Wake::Event(Some(ChannelEvent::Disconnected(error))) => {
                    tracing::warn!("network error: {}", error);
                    self.fail("channel disconnected");
                }
                Wake::Event(Some(ChannelEvent::Connected)) => {
                    // The channel was accepted before the handshake began.
                    tracing::debug!("ignoring connect event during handshake");
                }
            }
        }

        self.state
    }

    fn on_message_received(&mut self, buffer: &[u8]) {
        match self.internal_state {
            InternalState::ReadClientHello => self.on_client_hello(buffer),
            InternalState::ReadIdentify => self.on_identify(buffer),
            InternalState::ReadClientKeyExchange => self.on_client_key_exchange(buffer),
            InternalState::ReadSessionResponse => self.on_session_response(buffer),
            _ => self.fail("message received in unexpected state"),
        }
    }

    fn on_message_written(&mut self, _pending: usize) {
        match self.internal_state {
            InternalState::SendServerHello => {
                // The hello is on the wire; everything from here on is
                // encrypted when key agreement took place.
                if !self.session_key.is_empty() && !self.install_session_ciphers() {
                    return;
                }

                match self.identify {
                    proto::Identify::Srp => self.internal_state = InternalState::ReadIdentify,
                    proto::Identify::Anonymous => self.send_session_challenge(),
                }
            }
            InternalState::SendServerKeyExchange => {
                self.internal_state = InternalState::ReadClientKeyExchange;
            }
            InternalState::SendSessionChallenge => {
                self.internal_state = InternalState::ReadSessionResponse;
            }
            _ => self.fail("write completed in unexpected state"),
        }
    }

    fn on_client_hello(&mut self, buffer: &[u8]) {
        let hello = match proto::ClientHello::decode(buffer) {
            Ok(hello) => hello,
            Err(_) => return self.fail("malformed ClientHello"),
        };

        const KNOWN_METHODS: u32 =
            proto::ENCRYPTION_AES256_GCM | proto::ENCRYPTION_CHACHA20_POLY1305;
        if hello.encryption & KNOWN_METHODS == 0 {
            return self.fail("no supported encryption methods");
        }

        self.identify = match proto::Identify::try_from(hello.identify) {
            Ok(proto::Identify::Srp) => proto::Identify::Srp,
            Ok(proto::Identify::Anonymous) => {
                if self.anonymous_access != AnonymousAccess::Enable {
                    return self.fail("anonymous access is not allowed");
                }
                proto::Identify::Anonymous
            }
            Err(_) => return self.fail("unsupported identify method"),
        };

        let mut server_hello = proto::ServerHello::default();

        if let Some(key_pair) = &self.key_pair {
            if hello.iv.len() != IV_SIZE {
                return self.fail("client IV has an invalid size");
            }
            if hello.public_key.is_empty() {
                return self.fail("client public key is empty");
            }

            let shared_secret = match key_pair.session_key(&hello.public_key) {
                Ok(secret) => secret,
                Err(_) => return self.fail("key agreement failed"),
            };

            self.decrypt_iv = hello.iv;
            self.session_key =
                Zeroizing::new(GenericHash::hash(HashType::Blake2s256, &shared_secret));
            server_hello.iv = self.encrypt_iv.clone();
        }

        // AES-256-GCM is the fastest option when the hardware accelerates
        // it; otherwise ChaCha20-Poly1305 wins.
        self.encryption = if hello.encryption & proto::ENCRYPTION_AES256_GCM != 0
            && self.hardware_aes
        {
            proto::ENCRYPTION_AES256_GCM
        } else {
            proto::ENCRYPTION_CHACHA20_POLY1305
        };
        server_hello.encryption = self.encryption;

        self.internal_state = InternalState::SendServerHello;
        self.send_message(&server_hello);
    }

    fn on_identify(&mut self, buffer: &[u8]) {
        let identify = match proto::SrpIdentify::decode(buffer) {
            Ok(identify) => identify,
            Err(_) => return self.fail("malformed SrpIdentify"),
        };

        if identify.username.is_empty() {
            return self.fail("empty user name");
        }
        self.user_name = identify.username;

        let user_list = match self.user_list.clone() {
            Some(user_list) => user_list,
            None => return self.fail("no user list installed"),
        };

        let mut resolved = None;
        if let Some(user) = user_list.find(&self.user_name) {
            if user.is_enabled() {
                match srp::group_by_id(&user.group) {
                    Some(group) => {
                        self.session_types = user.sessions;
                        resolved = Some((
                            group,
                            user.salt.clone(),
                            BigUint::from_bytes_be(&user.verifier),
                        ));
                    }
                    None => {
                        tracing::error!("user '{}' has an invalid SRP group", user.name);
                    }
                }
            }
        }

        let (group, salt, verifier) = resolved.unwrap_or_else(|| {
            // Unknown or disabled identity: synthesize stable decoy
            // parameters so the exchange is indistinguishable from a real
            // one, but grant no sessions.
            self.session_types = 0;

            let mut hash = GenericHash::new(HashType::Blake2b512);
            hash.add_data(user_list.seed_key());
            hash.add_data(self.user_name.as_bytes());
            let salt = hash.result();

            let group = srp::fallback_group();
            let verifier = srp::calc_v(
                self.user_name.as_bytes(),
                user_list.seed_key(),
                &salt,
                group,
            );
            (group, salt, verifier)
        });

        self.n = group.n.clone();
        self.g = group.g.clone();
        self.salt = salt;
        self.v = verifier;
        self.b = BigUint::from_bytes_be(&random_bytes(SRP_SECRET_SIZE));
        self.b_pub = match srp::calc_b_pub(&self.b, &self.n, &self.g, &self.v) {
            Ok(b_pub) => b_pub,
            Err(_) => return self.fail("invalid server ephemeral"),
        };

        if self.n.is_zero() || self.g.is_zero() || self.salt.is_empty() || self.b_pub.is_zero() {
            return self.fail("invalid SRP parameters");
        }

        self.internal_state = InternalState::SendServerKeyExchange;
        self.encrypt_iv = random_bytes(IV_SIZE);

        let key_exchange = proto::SrpServerKeyExchange {
            number: self.n.to_bytes_be(),
            generator: self.g.to_bytes_be(),
            salt: self.salt.clone(),
            b: self.b_pub.to_bytes_be(),
            iv: self.encrypt_iv.clone(),
        };
        self.send_message(&key_exchange);
    }

    fn on_client_key_exchange(&mut self, buffer: &[u8]) {
        let key_exchange = match proto::SrpClientKeyExchange::decode(buffer) {
            Ok(key_exchange) => key_exchange,
            Err(_) => return self.fail("malformed SrpClientKeyExchange"),
        };

        if key_exchange.a.is_empty() {
            return self.fail("client ephemeral is empty");
        }
        if key_exchange.iv.len() != IV_SIZE {
            return self.fail("client IV has an invalid size");
        }

        self.a_pub = BigUint::from_bytes_be(&key_exchange.a);
        self.decrypt_iv = key_exchange.iv;

        let srp_key = match self.create_srp_key() {
            Some(srp_key) => srp_key,
            None => return self.fail("SRP key computation failed"),
        };

        match self.encryption {
            proto::ENCRYPTION_AES256_GCM | proto::ENCRYPTION_CHACHA20_POLY1305 => {
                // Both suites take a 256-bit key. Fold the key-agreement
                // key in when one exists.
                let mut hash = GenericHash::new(HashType::Blake2s256);
                if !self.session_key.is_empty() {
                    hash.add_data(&self.session_key);
                }
                hash.add_data(&srp_key);
                self.session_key = Zeroizing::new(hash.result());
            }
            _ => return self.fail("no encryption method negotiated"),
        }

        if !self.install_session_ciphers() {
            return;
        }

        self.send_session_challenge();
    }

    fn send_session_challenge(&mut self) {
        let challenge = proto::SessionChallenge {
            session_types: self.session_types,
            version: Some(proto::Version::current()),
        };

        self.internal_state = InternalState::SendSessionChallenge;
        self.send_message(&challenge);
    }

    fn on_session_response(&mut self, buffer: &[u8]) {
        // No further inbound traffic belongs to the handshake.
        if let Some(channel) = self.channel.as_mut() {
            channel.pause();
        }

        let response = match proto::SessionResponse::decode(buffer) {
            Ok(response) => response,
            Err(_) => return self.fail("malformed SessionResponse"),
        };

        self.peer_version = response.version.unwrap_or_default();

        let session_type = response.session_type;
        if session_type.count_ones() != 1 {
            return self.fail("client chose an invalid session type");
        }
        if self.session_types & session_type == 0 {
            return self.fail("client chose a session type that is not allowed");
        }
        self.session_type = session_type;

        if let Some(channel) = self.channel.as_ref() {
            tracing::info!(
                "authentication completed successfully for {}",
                channel.peer_address()
            );
        }

        self.state = State::Success;
    }

    // Single failure funnel: idempotent, destroys the channel, flips the
    // terminal state.
    fn fail(&mut self, site: &str) {
        let channel = match self.channel.take() {
            Some(channel) => channel,
            None => return,
        };

        tracing::info!(
            "authentication failed for {}: {}",
            channel.peer_address(),
            site
        );
        drop(channel);

        self.state = State::Failed;
    }

    // (Re)install both directions with the current key and IVs. Every
    // session-key change goes through here with fresh IVs.
    fn install_session_ciphers(&mut self) -> bool {
        let encryption = self.encryption;
        let build = move |key: &[u8], iv: &[u8]| match encryption {
            proto::ENCRYPTION_AES256_GCM => MessageCipher::aes256_gcm(key, iv),
            _ => MessageCipher::chacha20_poly1305(key, iv),
        };

        let encryptor = build(&self.session_key, &self.encrypt_iv);
        let decryptor = build(&self.session_key, &self.decrypt_iv);

        match (encryptor, decryptor) {
            (Ok(encryptor), Ok(decryptor)) => match self.channel.as_mut() {
                Some(channel) => {
                    channel.set_encryptor(Box::new(encryptor));
                    channel.set_decryptor(Box::new(decryptor));
                    true
                }
                None => false,
            },
            _ => {
                self.fail("failed to build session ciphers");
                false
            }
        }
    }

    fn create_srp_key(&self) -> Option<Zeroizing<Vec<u8>>> {
        if !srp::verify_a_mod_n(&self.a_pub, &self.n) {
            tracing::error!("invalid client public ephemeral");
            return None;
        }

        let u = match srp::calc_u(&self.a_pub, &self.b_pub, &self.n) {
            Ok(u) => u,
            Err(_) => return None,
        };

        let server_key = srp::calc_server_key(&self.a_pub, &self.v, &u, &self.b, &self.n);
        Some(Zeroizing::new(server_key.to_bytes_be()))
    }

    fn send_message(&mut self, message: &impl Message) {
        if let Some(channel) = self.channel.as_mut() {
            channel.send(proto::serialize(message));
        }
    }
}

impl Default for ServerAuthenticator {
    fn default() -> Self {
        ServerAuthenticator::new()
    }
}
