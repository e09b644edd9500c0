//! Builds the task queue for a transfer by walking the source tree.

use std::sync::Arc;

use crate::proto;
use crate::transfer::request::{
    reply_channel, FileRequestConsumer, FileRequestFactory, FileTaskTarget, ReplyStream,
};
use crate::transfer::task::{join_path, TaskList, TransferItem, TransferTask};

/// Walks the source endpoint with file-list requests and produces a
/// pre-order task list (every directory ahead of its children) plus the
/// total payload size. Dropping the builder mid-walk cancels cleanly:
/// outstanding replies are discarded by the dead reply stream.
pub struct TransferQueueBuilder {
    consumer: Arc<dyn FileRequestConsumer>,
    factory: FileRequestFactory,
    replies: ReplyStream,
    pending: TaskList,
    tasks: TaskList,
    total_size: u64,
}

impl TransferQueueBuilder {
    pub fn new(consumer: Arc<dyn FileRequestConsumer>, target: FileTaskTarget) -> Self {
        let (sink, replies) = reply_channel();
        TransferQueueBuilder {
            consumer,
            factory: FileRequestFactory::new(sink, target),
            replies,
            pending: TaskList::new(),
            tasks: TaskList::new(),
            total_size: 0,
        }
    }

    /// Resolve the selected items into a flat task list, or the first
    /// non-success error met while listing.
    pub async fn build(
        mut self,
        source_path: &str,
        target_path: &str,
        items: &[TransferItem],
    ) -> Result<(TaskList, u64), proto::FileError> {
        for item in items {
            self.pending.push_back(Self::task_for(
                source_path,
                target_path,
                &item.name,
                item.is_directory,
                item.size,
            ));
        }

        while let Some(task) = self.pending.pop_front() {
            if !task.is_directory() {
                self.total_size += task.size();
                self.tasks.push_back(task);
                continue;
            }

            let source_dir = task.source_path().to_string();
            let target_dir = task.target_path().to_string();
            self.tasks.push_back(task);

            self.consumer
                .do_request(self.factory.file_list_request(&source_dir));

            let completed = self
                .replies
                .next()
                .await
                .ok_or(proto::FileError::Unknown)?;
            if !matches!(
                completed.request.request,
                Some(proto::file_request::Request::FileList(_))
            ) {
                return Err(proto::FileError::Unknown);
            }
            if completed.reply.error() != proto::FileError::Success {
                return Err(completed.reply.error());
            }

            let listing = completed.reply.file_list.unwrap_or_default();

            // Children go to the front, in listing order, so the final
            // queue stays pre-order.
            for item in listing.items.into_iter().rev() {
                self.pending.push_front(Self::task_for(
                    &source_dir,
                    &target_dir,
                    &item.name,
                    item.is_directory,
                    item.size,
                ));
            }
        }

        Ok((self.tasks, self.total_size))
    }

    fn task_for(
        source_dir: &str,
        target_dir: &str,
        name: &str,
        is_directory: bool,
        size: u64,
    ) -> TransferTask {
        TransferTask::new(
            join_path(source_dir, name),
            join_path(target_dir, name),
            is_directory,
            if is_directory { 0 } else { size },
        )
    }
}
