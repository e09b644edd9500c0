//! Wire messages exchanged over the framed channel.
//!
//! The messages are Protocol Buffers, defined inline with prost derives so
//! the crate builds without a protoc step. Field numbers are part of the
//! wire contract and must never be reordered.

use prost::Message;

/// Bit advertising AES-256-GCM in `ClientHello::encryption`.
pub const ENCRYPTION_AES256_GCM: u32 = 1;
/// Bit advertising ChaCha20-Poly1305 in `ClientHello::encryption`.
pub const ENCRYPTION_CHACHA20_POLY1305: u32 = 2;

/// Identification method requested by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ::prost::Enumeration)]
#[repr(i32)]
pub enum Identify {
    Srp = 0,
    Anonymous = 1,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClientHello {
    /// Bitmask of encryption methods the client supports.
    #[prost(uint32, tag = "1")]
    pub encryption: u32,
    #[prost(enumeration = "Identify", tag = "2")]
    pub identify: i32,
    /// Client-chosen 12-byte nonce for the server's decryptor.
    #[prost(bytes = "vec", tag = "3")]
    pub iv: Vec<u8>,
    /// Client's ephemeral X25519 public key.
    #[prost(bytes = "vec", tag = "4")]
    pub public_key: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServerHello {
    /// The single encryption method selected by the server.
    #[prost(uint32, tag = "1")]
    pub encryption: u32,
    /// Server-chosen 12-byte nonce for the server's encryptor.
    #[prost(bytes = "vec", tag = "2")]
    pub iv: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SrpIdentify {
    #[prost(string, tag = "1")]
    pub username: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SrpServerKeyExchange {
    /// SRP modulus N, big-endian.
    #[prost(bytes = "vec", tag = "1")]
    pub number: Vec<u8>,
    /// SRP generator g, big-endian.
    #[prost(bytes = "vec", tag = "2")]
    pub generator: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub salt: Vec<u8>,
    /// Server public ephemeral B, big-endian.
    #[prost(bytes = "vec", tag = "4")]
    pub b: Vec<u8>,
    /// Fresh 12-byte nonce for the server's encryptor.
    #[prost(bytes = "vec", tag = "5")]
    pub iv: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SrpClientKeyExchange {
    /// Client public ephemeral A, big-endian.
    #[prost(bytes = "vec", tag = "1")]
    pub a: Vec<u8>,
    /// Fresh 12-byte nonce for the server's decryptor.
    #[prost(bytes = "vec", tag = "2")]
    pub iv: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SessionChallenge {
    /// Bitmask of session types the server permits for this identity.
    #[prost(uint32, tag = "1")]
    pub session_types: u32,
    #[prost(message, optional, tag = "2")]
    pub version: Option<Version>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SessionResponse {
    /// Exactly one bit: the session type the client chose.
    #[prost(uint32, tag = "1")]
    pub session_type: u32,
    #[prost(message, optional, tag = "2")]
    pub version: Option<Version>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Version {
    #[prost(uint32, tag = "1")]
    pub major: u32,
    #[prost(uint32, tag = "2")]
    pub minor: u32,
    #[prost(uint32, tag = "3")]
    pub patch: u32,
}

impl Version {
    /// Version of this build, taken from the crate manifest.
    pub fn current() -> Version {
        Version {
            major: env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
            minor: env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
            patch: env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0),
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Outcome of a file operation on either endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ::prost::Enumeration)]
#[repr(i32)]
pub enum FileError {
    Success = 0,
    Unknown = 1,
    InvalidRequest = 2,
    InvalidPathName = 3,
    PathNotFound = 4,
    PathAlreadyExists = 5,
    NoDrivesFound = 6,
    DiskFull = 7,
    AccessDenied = 8,
    FileOpenError = 9,
    FileCreateError = 10,
    FileWriteError = 11,
    FileReadError = 12,
}

impl FileError {
    /// Short human-readable description, used in error reporting.
    pub fn describe(self) -> &'static str {
        match self {
            FileError::Success => "success",
            FileError::Unknown => "unknown error",
            FileError::InvalidRequest => "invalid request",
            FileError::InvalidPathName => "invalid path name",
            FileError::PathNotFound => "path not found",
            FileError::PathAlreadyExists => "path already exists",
            FileError::NoDrivesFound => "no drives found",
            FileError::DiskFull => "disk full",
            FileError::AccessDenied => "access denied",
            FileError::FileOpenError => "could not open file",
            FileError::FileCreateError => "could not create file",
            FileError::FileWriteError => "could not write file",
            FileError::FileReadError => "could not read file",
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileListRequest {
    #[prost(string, tag = "1")]
    pub path: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileList {
    #[prost(message, repeated, tag = "1")]
    pub items: Vec<file_list::Item>,
}

pub mod file_list {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Item {
        #[prost(string, tag = "1")]
        pub name: String,
        #[prost(uint64, tag = "2")]
        pub size: u64,
        #[prost(bool, tag = "3")]
        pub is_directory: bool,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateDirectoryRequest {
    #[prost(string, tag = "1")]
    pub path: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DownloadRequest {
    #[prost(string, tag = "1")]
    pub path: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UploadRequest {
    #[prost(string, tag = "1")]
    pub path: String,
    #[prost(bool, tag = "2")]
    pub overwrite: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FilePacketRequest {
    #[prost(uint32, tag = "1")]
    pub flags: u32,
}

impl FilePacketRequest {
    pub const NO_FLAGS: u32 = 0;
    /// The transfer is being canceled; the source should short-circuit.
    pub const CANCEL: u32 = 1;
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FilePacket {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(uint32, tag = "2")]
    pub flags: u32,
}

impl FilePacket {
    /// Set on the final packet of a file.
    pub const LAST_PACKET: u32 = 1;

    pub fn is_last(&self) -> bool {
        self.flags & Self::LAST_PACKET != 0
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileRequest {
    #[prost(oneof = "file_request::Request", tags = "1, 2, 3, 4, 5, 6")]
    pub request: Option<file_request::Request>,
}

pub mod file_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Request {
        #[prost(message, tag = "1")]
        FileList(super::FileListRequest),
        #[prost(message, tag = "2")]
        CreateDirectory(super::CreateDirectoryRequest),
        #[prost(message, tag = "3")]
        Download(super::DownloadRequest),
        #[prost(message, tag = "4")]
        Upload(super::UploadRequest),
        #[prost(message, tag = "5")]
        PacketRequest(super::FilePacketRequest),
        #[prost(message, tag = "6")]
        Packet(super::FilePacket),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileReply {
    #[prost(enumeration = "FileError", tag = "1")]
    pub error_code: i32,
    #[prost(message, optional, tag = "2")]
    pub file_list: Option<FileList>,
    #[prost(message, optional, tag = "3")]
    pub packet: Option<FilePacket>,
}

impl FileReply {
    pub fn with_error(error: FileError) -> FileReply {
        FileReply {
            error_code: error as i32,
            ..Default::default()
        }
    }

    pub fn error(&self) -> FileError {
        FileError::try_from(self.error_code).unwrap_or(FileError::Unknown)
    }
}

/// Encode a message to its wire bytes.
pub fn serialize(message: &impl Message) -> Vec<u8> {
    message.encode_to_vec()
}
