//! Drives a transfer: one task at a time, one request in flight per
//! direction, with interactive error resolution.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::proto;
use crate::transfer::policy::{ErrorAction, ErrorKind, TransferError};
use crate::transfer::queue_builder::TransferQueueBuilder;
use crate::transfer::request::{
    reply_channel, CompletedRequest, FileRequestConsumer, FileRequestFactory, FileTaskTarget,
    ReplyStream,
};
use crate::transfer::task::{TaskList, TransferItem};
use crate::transfer::window::TransferWindow;
use crate::transfer::MAX_FILE_PACKET_SIZE;

/// How long a canceled transfer may keep draining before it is cut off.
const CANCEL_DRAIN: Duration = Duration::from_secs(5);

/// Direction of the transfer, deciding which endpoint is the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    /// Remote is the source, local is the target.
    Downloader,
    /// Local is the source, remote is the target.
    Uploader,
}

enum ControlMessage {
    SetAction(ErrorKind, ErrorAction),
    Stop,
}

/// Handle for the UI side: feeds decisions and cancellation back into the
/// running coordinator. Messages to a finished coordinator are dropped.
#[derive(Clone)]
pub struct TransferControl {
    tx: mpsc::UnboundedSender<ControlMessage>,
}

impl TransferControl {
    pub fn stop(&self) {
        let _ = self.tx.send(ControlMessage::Stop);
    }

    pub fn set_action(&self, kind: ErrorKind, action: ErrorAction) {
        let _ = self.tx.send(ControlMessage::SetAction(kind, action));
    }
}

enum Step {
    Control(Option<ControlMessage>),
    Reply(Option<CompletedRequest>),
    DrainExpired,
}

/// The file-transfer coordinator.
pub struct FileTransfer {
    transfer_type: TransferType,
    window: Arc<dyn TransferWindow>,
    consumer: Arc<dyn FileRequestConsumer>,

    factory_source: FileRequestFactory,
    factory_target: FileRequestFactory,
    replies: ReplyStream,

    control: TransferControl,
    control_rx: mpsc::UnboundedReceiver<ControlMessage>,

    tasks: TaskList,
    total_size: u64,
    total_transferred: u64,
    task_transferred: u64,
    total_percentage: u32,
    task_percentage: u32,

    actions: HashMap<ErrorKind, ErrorAction>,
    is_canceled: bool,
    cancel_deadline: Option<Instant>,
    finished: bool,
}

impl FileTransfer {
    pub fn new(
        transfer_type: TransferType,
        window: Arc<dyn TransferWindow>,
        consumer: Arc<dyn FileRequestConsumer>,
    ) -> FileTransfer {
        let (sink, replies) = reply_channel();
        let factory_local = FileRequestFactory::new(sink.clone(), FileTaskTarget::Local);
        let factory_remote = FileRequestFactory::new(sink, FileTaskTarget::Remote);

        let (factory_source, factory_target) = match transfer_type {
            TransferType::Downloader => (factory_remote, factory_local),
            TransferType::Uploader => (factory_local, factory_remote),
        };

        let (control_tx, control_rx) = mpsc::unbounded_channel();

        FileTransfer {
            transfer_type,
            window,
            consumer,
            factory_source,
            factory_target,
            replies,
            control: TransferControl { tx: control_tx },
            control_rx,
            tasks: TaskList::new(),
            total_size: 0,
            total_transferred: 0,
            task_transferred: 0,
            total_percentage: 0,
            task_percentage: 0,
            actions: HashMap::new(),
            is_canceled: false,
            cancel_deadline: None,
            finished: false,
        }
    }

    /// Handle for stop/decision delivery; also passed to the window when
    /// the transfer starts.
    pub fn control(&self) -> TransferControl {
        self.control.clone()
    }

    /// Preconfigure a sticky action, e.g. replace-all for an unattended
    /// transfer.
    pub fn set_action_for_kind(&mut self, kind: ErrorKind, action: ErrorAction) {
        self.actions.insert(kind, action);
    }

    /// Run the transfer to completion. The window is started first and
    /// stopped exactly once, whatever path the transfer takes.
    pub async fn run(mut self, source_path: &str, target_path: &str, items: Vec<TransferItem>) {
        self.window.start(self.control.clone());

        let builder = TransferQueueBuilder::new(self.consumer.clone(), self.factory_source.target());
        let build = builder.build(source_path, target_path, &items);
        tokio::pin!(build);

        // The queue builder is cancelable: a stop during the walk drops it
        // and finishes immediately.
        let built = loop {
            tokio::select! {
                result = &mut build => break Some(result),
                control = self.control_rx.recv() => match control {
                    Some(ControlMessage::SetAction(kind, action)) => {
                        self.actions.insert(kind, action);
                    }
                    Some(ControlMessage::Stop) | None => break None,
                },
            }
        };

        match built {
            None => {
                self.finish();
                return;
            }
            Some(Ok((tasks, total_size))) => {
                tracing::debug!(
                    "transfer queue ready: {} tasks, {} bytes",
                    tasks.len(),
                    total_size
                );
                self.tasks = tasks;
                self.total_size = total_size;

                if self.tasks.is_empty() {
                    self.finish();
                    return;
                }
                self.do_front_task(false);
            }
            Some(Err(error)) => {
                tracing::warn!("failed to build transfer queue: {}", error.describe());
                self.raise_error(ErrorKind::Queue, proto::FileError::Unknown, String::new());
            }
        }

        while !self.finished {
            let drain = self.cancel_deadline;
            let drain_at = drain.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            let step = tokio::select! {
                biased;
                control = self.control_rx.recv() => Step::Control(control),
                _ = tokio::time::sleep_until(drain_at), if drain.is_some() => Step::DrainExpired,
                completed = self.replies.next() => Step::Reply(completed),
            };

            match step {
                Step::Control(Some(ControlMessage::SetAction(kind, action))) => {
                    self.apply_action(kind, action);
                }
                Step::Control(Some(ControlMessage::Stop)) | Step::Control(None) => self.stop(),
                Step::DrainExpired => self.finish(),
                Step::Reply(Some(completed)) => self.on_reply(completed),
                Step::Reply(None) => {
                    // Every endpoint dropped its requests; nothing can
                    // make progress anymore.
                    self.raise_error(ErrorKind::Other, proto::FileError::Unknown, String::new());
                }
            }
        }
    }

    fn stop(&mut self) {
        if self.is_canceled {
            return;
        }
        tracing::debug!("transfer cancel requested");
        self.is_canceled = true;
        self.cancel_deadline = Some(Instant::now() + CANCEL_DRAIN);
    }

    fn on_reply(&mut self, completed: CompletedRequest) {
        let from_target = match self.transfer_type {
            TransferType::Downloader => completed.target == FileTaskTarget::Local,
            TransferType::Uploader => completed.target == FileTaskTarget::Remote,
        };

        if from_target {
            self.target_reply(completed.request, completed.reply);
        } else {
            self.source_reply(completed.request, completed.reply);
        }
    }

    fn target_reply(&mut self, request: proto::FileRequest, reply: proto::FileReply) {
        use proto::file_request::Request;

        let front = match self.tasks.front() {
            Some(front) => front.clone(),
            None => return,
        };

        match request.request {
            Some(Request::CreateDirectory(_)) => {
                // An existing directory is as good as a created one.
                if matches!(
                    reply.error(),
                    proto::FileError::Success | proto::FileError::PathAlreadyExists
                ) {
                    self.next_task();
                    return;
                }
                self.raise_error(
                    ErrorKind::CreateDirectory,
                    reply.error(),
                    front.target_path().to_string(),
                );
            }
            Some(Request::Upload(_)) => {
                if reply.error() != proto::FileError::Success {
                    let kind = if reply.error() == proto::FileError::PathAlreadyExists {
                        ErrorKind::AlreadyExists
                    } else {
                        ErrorKind::CreateFile
                    };
                    self.raise_error(kind, reply.error(), front.target_path().to_string());
                    return;
                }

                self.consumer.do_request(
                    self.factory_source
                        .packet_request(proto::FilePacketRequest::NO_FLAGS),
                );
            }
            Some(Request::Packet(packet)) => {
                if reply.error() != proto::FileError::Success {
                    self.raise_error(
                        ErrorKind::WriteFile,
                        reply.error(),
                        front.target_path().to_string(),
                    );
                    return;
                }

                self.account_packet(front.size());

                if packet.is_last() {
                    self.next_task();
                    return;
                }

                let flags = if self.is_canceled {
                    proto::FilePacketRequest::CANCEL
                } else {
                    proto::FilePacketRequest::NO_FLAGS
                };
                self.consumer
                    .do_request(self.factory_source.packet_request(flags));
            }
            _ => {
                self.raise_error(ErrorKind::Other, proto::FileError::Unknown, String::new());
            }
        }
    }

    fn source_reply(&mut self, request: proto::FileRequest, reply: proto::FileReply) {
        use proto::file_request::Request;

        let front = match self.tasks.front() {
            Some(front) => front.clone(),
            None => return,
        };

        match request.request {
            Some(Request::Download(_)) => {
                if reply.error() != proto::FileError::Success {
                    self.raise_error(
                        ErrorKind::OpenFile,
                        reply.error(),
                        front.source_path().to_string(),
                    );
                    return;
                }

                self.consumer.do_request(
                    self.factory_target
                        .upload_request(front.target_path(), front.overwrite()),
                );
            }
            Some(Request::PacketRequest(_)) => {
                if reply.error() != proto::FileError::Success {
                    self.raise_error(
                        ErrorKind::ReadFile,
                        reply.error(),
                        front.source_path().to_string(),
                    );
                    return;
                }

                let packet = reply.packet.unwrap_or_default();
                self.consumer.do_request(self.factory_target.packet(packet));
            }
            _ => {
                self.raise_error(ErrorKind::Other, proto::FileError::Unknown, String::new());
            }
        }
    }

    // Progress is charged per confirmed packet and reported only when a
    // percentage actually moves.
    fn account_packet(&mut self, task_size: u64) {
        if task_size == 0 || self.total_size == 0 {
            return;
        }

        let remaining = task_size.saturating_sub(self.task_transferred);
        let charge = remaining.min(MAX_FILE_PACKET_SIZE as u64);
        self.task_transferred += charge;
        self.total_transferred += charge;

        let task_percentage = (self.task_transferred * 100 / task_size) as u32;
        let total_percentage = (self.total_transferred * 100 / self.total_size) as u32;

        if task_percentage != self.task_percentage || total_percentage != self.total_percentage {
            self.task_percentage = task_percentage;
            self.total_percentage = total_percentage;
            self.window
                .set_current_progress(total_percentage, task_percentage);
        }
    }

    fn raise_error(&mut self, kind: ErrorKind, code: proto::FileError, path: String) {
        if let Some(action) = self.actions.get(&kind).copied() {
            self.apply_action(kind, action);
            return;
        }

        self.window
            .error_occurred(&TransferError::new(kind, code, path));
    }

    fn apply_action(&mut self, kind: ErrorKind, action: ErrorAction) {
        match action {
            ErrorAction::Abort => self.finish(),
            ErrorAction::Replace | ErrorAction::ReplaceAll => {
                if action == ErrorAction::ReplaceAll {
                    self.actions.insert(kind, action);
                }
                self.do_front_task(true);
            }
            ErrorAction::Skip | ErrorAction::SkipAll => {
                if action == ErrorAction::SkipAll {
                    self.actions.insert(kind, action);
                }
                self.next_task();
            }
            ErrorAction::Ask => {
                tracing::warn!("ask is not a resolution for {:?}", kind);
            }
        }
    }

    fn do_front_task(&mut self, overwrite: bool) {
        self.task_percentage = 0;
        self.task_transferred = 0;

        let front = match self.tasks.front_mut() {
            Some(front) => front,
            None => return,
        };
        front.set_overwrite(overwrite);

        let source_path = front.source_path().to_string();
        let target_path = front.target_path().to_string();
        let is_directory = front.is_directory();

        self.window.set_current_item(&source_path, &target_path);

        if is_directory {
            self.consumer
                .do_request(self.factory_target.create_directory_request(&target_path));
        } else {
            self.consumer
                .do_request(self.factory_source.download_request(&source_path));
        }
    }

    // A task leaves the queue only once its terminal reply was seen.
    fn next_task(&mut self) {
        if self.is_canceled {
            self.tasks.clear();
        } else {
            self.tasks.pop_front();
        }

        if self.tasks.is_empty() {
            self.cancel_deadline = None;
            self.finish();
            return;
        }

        self.do_front_task(false);
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.window.stop();
    }
}
