#![forbid(unsafe_code)]

//! Where page subscriptions come from, and the messages they produce.
//!
//! The window manager only knows the [`PageSource`] seam: give it a
//! [`PageRequest`], get back a cancellable handle. Updates flow back
//! asynchronously into the session [`Inbox`] as [`PageEnvelope`]s stamped
//! with the subscription id they belong to.

use std::fmt;
use std::sync::Arc;
use std::sync::mpsc;

use mailview_core::{PageIndex, PageQuery, SyncToken};
use serde::de::DeserializeOwned;

use crate::channel::{ChannelState, ResilientChannel};
use crate::codec::JsonDecoder;
use crate::reconnect::ReconnectPolicy;
use crate::routes::Routes;
use crate::subscription::{SubId, SubscriptionHandle};
use crate::transport::Transport;

/// Request to keep one page populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub sub_id: SubId,
    pub page: PageIndex,
    pub query: PageQuery,
}

/// One channel state for one page subscription.
pub struct PageEnvelope<T> {
    pub sub_id: SubId,
    pub page: PageIndex,
    pub state: ChannelState<Vec<T>>,
}

impl<T> PageEnvelope<T> {
    /// Envelope carrying a freshly received page.
    #[must_use]
    pub fn open(sub_id: SubId, page: PageIndex, items: Vec<T>) -> Self {
        Self {
            sub_id,
            page,
            state: ChannelState::Open {
                value: Some(Arc::new(items)),
            },
        }
    }
}

impl<T> fmt::Debug for PageEnvelope<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageEnvelope")
            .field("sub_id", &self.sub_id)
            .field("page", &self.page)
            .field("state", &self.state.label())
            .field("len", &self.state.value().map(|v| v.len()))
            .finish()
    }
}

/// Everything a session receives from its background channels.
#[derive(Debug)]
pub enum Inbox<T> {
    Page(PageEnvelope<T>),
    Sync(ChannelState<SyncToken>),
}

/// Handle that stops a subscription.
pub trait Cancel {
    /// Stop delivering updates and release the underlying channel.
    fn cancel(&self);
}

impl Cancel for SubscriptionHandle {
    fn cancel(&self) {
        SubscriptionHandle::cancel(self);
    }
}

/// Factory of page subscriptions.
pub trait PageSource<T> {
    type Handle: Cancel;

    /// Start a subscription for `request`. Its updates must carry
    /// `request.sub_id`.
    fn subscribe(&mut self, request: PageRequest) -> Self::Handle;
}

/// Production source: one [`ResilientChannel`] per page, all feeding the
/// same inbox.
pub struct ChannelPageSource<T> {
    transport: Arc<dyn Transport>,
    routes: Routes,
    policy: ReconnectPolicy,
    inbox: mpsc::Sender<Inbox<T>>,
}

impl<T> ChannelPageSource<T> {
    pub fn new(
        transport: Arc<dyn Transport>,
        routes: Routes,
        policy: ReconnectPolicy,
        inbox: mpsc::Sender<Inbox<T>>,
    ) -> Self {
        Self {
            transport,
            routes,
            policy,
            inbox,
        }
    }
}

impl<T> PageSource<T> for ChannelPageSource<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    type Handle = SubscriptionHandle;

    fn subscribe(&mut self, request: PageRequest) -> SubscriptionHandle {
        let PageRequest {
            sub_id,
            page,
            query,
        } = request;
        let limit = query.limit;
        let decoder = JsonDecoder::<Vec<T>>::new().with_validator(move |items| {
            if items.len() <= limit {
                Ok(())
            } else {
                Err(format!("page has {} items, limit is {limit}", items.len()))
            }
        });
        let channel = ResilientChannel::new(
            Arc::clone(&self.transport),
            self.routes.page_endpoint(&query),
            Arc::new(decoder),
        )
        .with_policy(self.policy.clone());

        let inbox = self.inbox.clone();
        channel.spawn(sub_id, None, move |state| {
            inbox
                .send(Inbox::Page(PageEnvelope {
                    sub_id,
                    page,
                    state,
                }))
                .is_ok()
        })
    }
}

impl<T> fmt::Debug for ChannelPageSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelPageSource")
            .field("routes", &self.routes)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
