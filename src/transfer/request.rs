//! Typed file requests and the reply routing between producers and
//! endpoints.
//!
//! A producer (coordinator or queue builder) creates requests through a
//! factory bound to one side of the transfer; an endpoint executes them
//! and routes the reply back through the sink embedded in the request.
//! When the producer is gone its receiving side is gone too, so late
//! replies are dropped silently instead of dangling.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::proto;

/// Which endpoint a request is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileTaskTarget {
    Local,
    Remote,
}

/// A request together with its reply, as delivered back to the producer.
#[derive(Debug)]
pub struct CompletedRequest {
    pub target: FileTaskTarget,
    pub request: proto::FileRequest,
    pub reply: proto::FileReply,
}

/// Producer-side reply route. Cloned into every request a factory builds.
#[derive(Clone)]
pub struct ReplySink {
    tx: mpsc::UnboundedSender<CompletedRequest>,
}

impl ReplySink {
    fn deliver(&self, completed: CompletedRequest) {
        // The producer may already be gone; late replies are dropped.
        let _ = self.tx.send(completed);
    }
}

/// Producer-side reply stream. Dropping it detaches the producer from all
/// in-flight requests.
pub struct ReplyStream {
    rx: mpsc::UnboundedReceiver<CompletedRequest>,
}

impl ReplyStream {
    pub async fn next(&mut self) -> Option<CompletedRequest> {
        self.rx.recv().await
    }
}

/// A reply route pair for one producer.
pub fn reply_channel() -> (ReplySink, ReplyStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ReplySink { tx }, ReplyStream { rx })
}

/// A typed file request addressed to one endpoint, carrying its reply
/// route.
pub struct FileRequest {
    target: FileTaskTarget,
    request: proto::FileRequest,
    sink: ReplySink,
}

impl FileRequest {
    pub fn target(&self) -> FileTaskTarget {
        self.target
    }

    pub fn request(&self) -> &proto::FileRequest {
        &self.request
    }

    /// Complete the request; the reply travels back to the producer if it
    /// is still listening.
    pub fn reply(self, reply: proto::FileReply) {
        let completed = CompletedRequest {
            target: self.target,
            request: self.request,
            reply,
        };
        let sink = self.sink;
        sink.deliver(completed);
    }
}

/// Builds requests addressed to a fixed target, each wired to the
/// producer's reply stream.
pub struct FileRequestFactory {
    target: FileTaskTarget,
    sink: ReplySink,
}

impl FileRequestFactory {
    pub fn new(sink: ReplySink, target: FileTaskTarget) -> FileRequestFactory {
        FileRequestFactory { target, sink }
    }

    pub fn target(&self) -> FileTaskTarget {
        self.target
    }

    pub fn file_list_request(&self, path: &str) -> FileRequest {
        self.make(proto::file_request::Request::FileList(
            proto::FileListRequest {
                path: path.to_string(),
            },
        ))
    }

    pub fn create_directory_request(&self, path: &str) -> FileRequest {
        self.make(proto::file_request::Request::CreateDirectory(
            proto::CreateDirectoryRequest {
                path: path.to_string(),
            },
        ))
    }

    pub fn download_request(&self, path: &str) -> FileRequest {
        self.make(proto::file_request::Request::Download(
            proto::DownloadRequest {
                path: path.to_string(),
            },
        ))
    }

    pub fn upload_request(&self, path: &str, overwrite: bool) -> FileRequest {
        self.make(proto::file_request::Request::Upload(proto::UploadRequest {
            path: path.to_string(),
            overwrite,
        }))
    }

    pub fn packet_request(&self, flags: u32) -> FileRequest {
        self.make(proto::file_request::Request::PacketRequest(
            proto::FilePacketRequest { flags },
        ))
    }

    pub fn packet(&self, packet: proto::FilePacket) -> FileRequest {
        self.make(proto::file_request::Request::Packet(packet))
    }

    fn make(&self, request: proto::file_request::Request) -> FileRequest {
        FileRequest {
            target: self.target,
            request: proto::FileRequest {
                request: Some(request),
            },
            sink: self.sink.clone(),
        }
    }
}

/// An endpoint able to execute file requests.
pub trait FileRequestConsumer: Send + Sync {
    fn do_request(&self, request: FileRequest);
}

/// Dispatches requests to the endpoint matching their target.
pub struct TargetRouter {
    local: Arc<dyn FileRequestConsumer>,
    remote: Arc<dyn FileRequestConsumer>,
}

impl TargetRouter {
    pub fn new(
        local: Arc<dyn FileRequestConsumer>,
        remote: Arc<dyn FileRequestConsumer>,
    ) -> TargetRouter {
        TargetRouter { local, remote }
    }
}

impl FileRequestConsumer for TargetRouter {
    fn do_request(&self, request: FileRequest) {
        match request.target() {
            FileTaskTarget::Local => self.local.do_request(request),
            FileTaskTarget::Remote => self.remote.do_request(request),
        }
    }
}
