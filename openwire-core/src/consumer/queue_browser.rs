//! Queue browser (spec.md §4.9): a read-only, non-consuming view over a
//! queue's current contents. Grounded on
//! `activemq-cpp/src/main/activemq/core/ActiveMQConsumerKernel.cpp`'s
//! browser mode, which is a thin flag on the same consumer machinery rather
//! than a distinct command set: `ConsumerInfo.browser = true`, and the
//! broker signals the end of the snapshot with a null-bodied
//! `MessageDispatch` instead of a dedicated "done" command.

use crate::command::destination::Destination;
use crate::command::message::Message;
use crate::consumer::kernel::{ConsumerKernel, ConsumerOptions};
use crate::error::OpenWireResult;
use crate::session::kernel::SessionKernel;
use std::sync::Arc;
use std::time::Duration;

/// Opens a queue browser over `destination`: a consumer created with
/// `browser = true` and the session's queue-browser prefetch.
pub async fn open(session: &SessionKernel, destination: Destination, queue_browser_prefetch: i32) -> OpenWireResult<QueueBrowser> {
    let options = ConsumerOptions {
        prefetch_size: queue_browser_prefetch,
        browser: true,
        ..ConsumerOptions::default()
    };
    let consumer = session.create_consumer(destination, options).await?;
    Ok(QueueBrowser { consumer })
}

pub struct QueueBrowser {
    consumer: Arc<ConsumerKernel>,
}

impl QueueBrowser {
    /// Returns the next message in the snapshot, or `None` once the broker's
    /// end-of-browse marker has been drained.
    pub async fn next(&self, timeout: Option<Duration>) -> OpenWireResult<Option<Message>> {
        if self.consumer.browse_done() {
            return Ok(None);
        }
        self.consumer.receive(timeout).await
    }

    pub fn browse_done(&self) -> bool {
        self.consumer.browse_done()
    }

    pub async fn close(&self) -> OpenWireResult<()> {
        self.consumer.close().await
    }
}
