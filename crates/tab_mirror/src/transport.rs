//! Request/response plumbing between the mirror and an authority living on
//! the other end of a tokio channel.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use shared::{
    channel::AuthorityCall,
    domain::{GroupId, TabAddress, ViewColumn},
    protocol::{MirrorReply, MirrorRequest},
};
use tokio::sync::mpsc;

use crate::EditorTabsAuthority;

#[derive(Clone)]
pub struct ChannelAuthority {
    calls: mpsc::Sender<AuthorityCall>,
}

impl ChannelAuthority {
    pub fn new(calls: mpsc::Sender<AuthorityCall>) -> Self {
        Self { calls }
    }

    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<AuthorityCall>) {
        let (calls, rx) = mpsc::channel(buffer.max(1));
        (Self::new(calls), rx)
    }

    async fn call(&self, request: MirrorRequest) -> Result<MirrorReply> {
        let (call, reply) = AuthorityCall::new(request);
        self.calls
            .send(call)
            .await
            .map_err(|_| anyhow!("editor authority channel is closed"))?;
        let reply = reply
            .await
            .context("editor authority dropped the request without replying")?;
        match reply {
            MirrorReply::Error(err) => Err(anyhow!(err)),
            reply => Ok(reply),
        }
    }

    async fn call_close(&self, request: MirrorRequest) -> Result<bool> {
        match self.call(request).await? {
            MirrorReply::Closed { all_closed } => Ok(all_closed),
            other => Err(anyhow!("unexpected reply to close request: {other:?}")),
        }
    }
}

#[async_trait]
impl EditorTabsAuthority for ChannelAuthority {
    async fn close_tabs(&self, tabs: Vec<TabAddress>, preserve_focus: bool) -> Result<bool> {
        self.call_close(MirrorRequest::CloseTabs {
            tabs,
            preserve_focus,
        })
        .await
    }

    async fn close_groups(&self, group_ids: Vec<GroupId>, preserve_focus: bool) -> Result<bool> {
        self.call_close(MirrorRequest::CloseGroups {
            group_ids,
            preserve_focus,
        })
        .await
    }

    async fn move_tab(
        &self,
        tab: TabAddress,
        index: usize,
        view_column: ViewColumn,
        preserve_focus: bool,
    ) -> Result<()> {
        match self
            .call(MirrorRequest::MoveTab {
                tab,
                index,
                view_column,
                preserve_focus,
            })
            .await?
        {
            MirrorReply::Moved => Ok(()),
            other => Err(anyhow!("unexpected reply to move request: {other:?}")),
        }
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
