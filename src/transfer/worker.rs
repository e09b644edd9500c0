//! Local endpoint: executes file requests against the filesystem.
//!
//! One worker serves one side of a transfer. Download/upload requests
//! open a packetizer/depacketizer that subsequent packet traffic streams
//! through; at most one of each is active at a time, matching the
//! one-request-in-flight discipline of the pipeline.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;

use crate::proto;
use crate::transfer::request::{FileRequest, FileRequestConsumer};
use crate::transfer::MAX_FILE_PACKET_SIZE;

/// Reads a source file slice by slice.
struct FilePacketizer {
    file: File,
    left: u64,
}

impl FilePacketizer {
    fn open(path: &Path) -> std::io::Result<FilePacketizer> {
        let file = File::open(path)?;
        let left = file.metadata()?.len();
        Ok(FilePacketizer { file, left })
    }

    fn read_next_packet(&mut self, flags: u32) -> std::io::Result<proto::FilePacket> {
        if flags & proto::FilePacketRequest::CANCEL != 0 {
            // Short-circuit: pretend the file ended here.
            self.left = 0;
            return Ok(proto::FilePacket {
                data: Vec::new(),
                flags: proto::FilePacket::LAST_PACKET,
            });
        }

        let chunk = self.left.min(MAX_FILE_PACKET_SIZE as u64) as usize;
        let mut data = vec![0u8; chunk];
        self.file.read_exact(&mut data)?;
        self.left -= chunk as u64;

        let flags = if self.left == 0 {
            proto::FilePacket::LAST_PACKET
        } else {
            0
        };
        Ok(proto::FilePacket { data, flags })
    }

    fn is_finished(&self) -> bool {
        self.left == 0
    }
}

/// Writes a target file packet by packet. An incomplete file is removed
/// on drop so aborted uploads leave no partial garbage behind.
struct FileDepacketizer {
    file: File,
    path: PathBuf,
    complete: bool,
}

impl FileDepacketizer {
    fn create(path: &Path, overwrite: bool) -> std::io::Result<FileDepacketizer> {
        let mut options = OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }

        Ok(FileDepacketizer {
            file: options.open(path)?,
            path: path.to_path_buf(),
            complete: false,
        })
    }

    fn write_next_packet(&mut self, packet: &proto::FilePacket) -> std::io::Result<()> {
        self.file.write_all(&packet.data)?;
        if packet.is_last() {
            self.file.flush()?;
            self.complete = true;
        }
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.complete
    }
}

impl Drop for FileDepacketizer {
    fn drop(&mut self) {
        if !self.complete {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Hands requests to the worker task. Requests sent after the worker is
/// gone are dropped, which in turn drops their replies.
#[derive(Clone)]
pub struct FileWorkerProxy {
    tx: mpsc::UnboundedSender<FileRequest>,
}

impl FileRequestConsumer for FileWorkerProxy {
    fn do_request(&self, request: FileRequest) {
        let _ = self.tx.send(request);
    }
}

/// Executes file requests against the local filesystem.
pub struct FileWorker {
    rx: mpsc::UnboundedReceiver<FileRequest>,
    packetizer: Option<FilePacketizer>,
    depacketizer: Option<FileDepacketizer>,
}

impl FileWorker {
    pub fn new() -> (FileWorker, FileWorkerProxy) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            FileWorker {
                rx,
                packetizer: None,
                depacketizer: None,
            },
            FileWorkerProxy { tx },
        )
    }

    /// Serve requests until every proxy is gone.
    pub async fn run(mut self) {
        while let Some(request) = self.rx.recv().await {
            let reply = self.execute(request.request());
            request.reply(reply);
        }
    }

    fn execute(&mut self, request: &proto::FileRequest) -> proto::FileReply {
        use proto::file_request::Request;

        match &request.request {
            Some(Request::FileList(request)) => self.do_file_list(request),
            Some(Request::CreateDirectory(request)) => self.do_create_directory(request),
            Some(Request::Download(request)) => self.do_download(request),
            Some(Request::Upload(request)) => self.do_upload(request),
            Some(Request::PacketRequest(request)) => self.do_packet_request(request),
            Some(Request::Packet(packet)) => self.do_packet(packet),
            None => proto::FileReply::with_error(proto::FileError::InvalidRequest),
        }
    }

    fn do_file_list(&mut self, request: &proto::FileListRequest) -> proto::FileReply {
        let path = Path::new(&request.path);

        match path.metadata() {
            Err(_) => return proto::FileReply::with_error(proto::FileError::PathNotFound),
            Ok(metadata) if !metadata.is_dir() => {
                return proto::FileReply::with_error(proto::FileError::InvalidPathName);
            }
            Ok(_) => {}
        }

        let entries = match std::fs::read_dir(path) {
            Ok(entries) => entries,
            Err(_) => return proto::FileReply::with_error(proto::FileError::AccessDenied),
        };

        let mut items = Vec::new();
        for entry in entries.flatten() {
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            items.push(proto::file_list::Item {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: if metadata.is_dir() { 0 } else { metadata.len() },
                is_directory: metadata.is_dir(),
            });
        }
        // Stable ordering keeps queue construction deterministic.
        items.sort_by(|a, b| a.name.cmp(&b.name));

        proto::FileReply {
            error_code: proto::FileError::Success as i32,
            file_list: Some(proto::FileList { items }),
            packet: None,
        }
    }

    fn do_create_directory(&mut self, request: &proto::CreateDirectoryRequest) -> proto::FileReply {
        let path = Path::new(&request.path);

        if path.exists() {
            return proto::FileReply::with_error(proto::FileError::PathAlreadyExists);
        }
        if std::fs::create_dir(path).is_err() {
            return proto::FileReply::with_error(proto::FileError::AccessDenied);
        }

        proto::FileReply::with_error(proto::FileError::Success)
    }

    fn do_download(&mut self, request: &proto::DownloadRequest) -> proto::FileReply {
        match FilePacketizer::open(Path::new(&request.path)) {
            Ok(packetizer) => {
                self.packetizer = Some(packetizer);
                proto::FileReply::with_error(proto::FileError::Success)
            }
            Err(_) => proto::FileReply::with_error(proto::FileError::FileOpenError),
        }
    }

    fn do_upload(&mut self, request: &proto::UploadRequest) -> proto::FileReply {
        let path = Path::new(&request.path);

        if !request.overwrite && path.exists() {
            return proto::FileReply::with_error(proto::FileError::PathAlreadyExists);
        }

        match FileDepacketizer::create(path, request.overwrite) {
            Ok(depacketizer) => {
                self.depacketizer = Some(depacketizer);
                proto::FileReply::with_error(proto::FileError::Success)
            }
            Err(_) => proto::FileReply::with_error(proto::FileError::FileCreateError),
        }
    }

    fn do_packet_request(&mut self, request: &proto::FilePacketRequest) -> proto::FileReply {
        let Some(packetizer) = self.packetizer.as_mut() else {
            tracing::warn!("unexpected file packet request");
            return proto::FileReply::with_error(proto::FileError::Unknown);
        };

        match packetizer.read_next_packet(request.flags) {
            Ok(packet) => {
                if packetizer.is_finished() {
                    self.packetizer = None;
                }
                proto::FileReply {
                    error_code: proto::FileError::Success as i32,
                    file_list: None,
                    packet: Some(packet),
                }
            }
            Err(_) => {
                self.packetizer = None;
                proto::FileReply::with_error(proto::FileError::FileReadError)
            }
        }
    }

    fn do_packet(&mut self, packet: &proto::FilePacket) -> proto::FileReply {
        let Some(depacketizer) = self.depacketizer.as_mut() else {
            tracing::warn!("unexpected file packet");
            return proto::FileReply::with_error(proto::FileError::Unknown);
        };

        let reply = match depacketizer.write_next_packet(packet) {
            Ok(()) => proto::FileReply::with_error(proto::FileError::Success),
            Err(_) => proto::FileReply::with_error(proto::FileError::FileWriteError),
        };

        if depacketizer.is_complete() || reply.error() != proto::FileError::Success {
            self.depacketizer = None;
        }
        reply
    }
}
