use domain::{
    sort_newest_first, AuthMode, AuthorId, Comment, CommentId, CommentText, FeedError, NewComment,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::signals::{AuthPrompts, Notice, Notices};
use crate::subscription::Subscription;
use crate::traits::{CommentStore, IdentityProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedStatus {
    /// Nothing has been applied yet.
    #[default]
    Loading,
    Ready,
    /// The last applied load failed; `comments` still holds the previous snapshot.
    Unavailable,
}

/// Everything the presentation layer renders from. Published whole through
/// a watch channel, so readers never see a half-applied load.
#[derive(Debug, Clone)]
pub struct FeedState {
    pub comments: Arc<[Comment]>,
    pub status: FeedStatus,
    /// Sequence number of the last applied load, success or failure.
    pub revision: u64,
    pub draft: String,
    pub submitting: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum FeedView<'a> {
    Loading,
    NoCommentsYet,
    Comments(&'a [Comment]),
    Unavailable(&'a [Comment]),
}

impl Default for FeedState {
    fn default() -> Self {
        Self {
            comments: Arc::from(Vec::new()),
            status: FeedStatus::default(),
            revision: 0,
            draft: String::new(),
            submitting: false,
        }
    }
}

impl FeedState {
    pub fn view(&self) -> FeedView<'_> {
        match self.status {
            FeedStatus::Loading => FeedView::Loading,
            FeedStatus::Ready if self.comments.is_empty() => FeedView::NoCommentsYet,
            FeedStatus::Ready => FeedView::Comments(&self.comments),
            FeedStatus::Unavailable => FeedView::Unavailable(&self.comments),
        }
    }
}

struct Inner {
    store: Arc<dyn CommentStore>,
    identity: Arc<dyn IdentityProvider>,
    prompts: AuthPrompts,
    notices: Notices,
    state: watch::Sender<FeedState>,
    next_seq: AtomicU64,
    submitting: AtomicBool,
    cancel: CancellationToken,
}

/// Keeps a local, newest-first view of the comment feed in step with the
/// store and mediates submissions.
///
/// New comments are never spliced in locally: after a successful insert the
/// store's change notification triggers a full reload, and that reload is
/// what makes the comment visible.
pub struct FeedController {
    inner: Arc<Inner>,
    started: AtomicBool,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl FeedController {
    pub fn new(
        store: Arc<dyn CommentStore>,
        identity: Arc<dyn IdentityProvider>,
        prompts: AuthPrompts,
        notices: Notices,
    ) -> Self {
        let (state, _rx) = watch::channel(FeedState::default());
        Self {
            inner: Arc::new(Inner {
                store,
                identity,
                prompts,
                notices,
                state,
                next_seq: AtomicU64::new(0),
                submitting: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            }),
            started: AtomicBool::new(false),
            listener: Mutex::new(None),
        }
    }

    /// Subscribe to store changes and run the initial load. A failed
    /// initial load is reported through the state, not as an error here.
    pub async fn start(&self) -> Result<(), FeedError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(FeedError::AlreadyStarted);
        }

        let subscription = match self.inner.store.subscribe().await {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to subscribe to comment changes: {:#}", e);
                self.started.store(false, Ordering::SeqCst);
                return Err(FeedError::store(&e));
            }
        };

        let handle = tokio::spawn(listen(self.inner.clone(), subscription));
        *self.listener.lock().unwrap() = Some(handle);
        info!("Feed controller started");

        let _ = self.load_feed().await;
        Ok(())
    }

    /// Stop live updates and release the subscription. Loads still in
    /// flight finish but their results are dropped.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let handle = self.listener.lock().unwrap().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Feed listener ended abnormally: {}", e);
            }
        }
        info!("Feed controller stopped");
    }

    pub fn is_active(&self) -> bool {
        !self.inner.cancel.is_cancelled()
    }

    pub async fn load_feed(&self) -> Result<(), FeedError> {
        self.inner.load_feed().await
    }

    pub async fn submit_comment(&self, text: &str) -> Result<CommentId, FeedError> {
        self.inner.submit_comment(text).await
    }

    pub fn set_draft(&self, text: impl Into<String>) {
        let text = text.into();
        self.inner.state.send_modify(|s| s.draft = text);
    }

    pub fn state(&self) -> FeedState {
        self.inner.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<FeedState> {
        self.inner.state.subscribe()
    }
}

impl Drop for FeedController {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

async fn listen(inner: Arc<Inner>, mut subscription: Subscription) {
    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            event = subscription.next() => match event {
                Some(ev) => {
                    debug!("Change received ({:?}), reloading feed", ev);
                    let inner = inner.clone();
                    tokio::spawn(async move {
                        let _ = inner.load_feed().await;
                    });
                }
                None => {
                    warn!("Change subscription closed, live updates stopped");
                    break;
                }
            },
        }
    }
    drop(subscription);
    info!("Feed listener stopped, subscription released");
}

impl Inner {
    async fn load_feed(&self) -> Result<(), FeedError> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Feed load #{} started", seq);

        let result = self.fetch_and_join().await;

        if self.cancel.is_cancelled() {
            debug!("Feed load #{} finished after teardown, discarded", seq);
            return result.map(|_| ()).map_err(|e| FeedError::store(&e));
        }

        match result {
            Ok(comments) => {
                let count = comments.len();
                let applied = self.state.send_if_modified(|s| {
                    if seq <= s.revision {
                        return false;
                    }
                    s.comments = comments.into();
                    s.status = FeedStatus::Ready;
                    s.revision = seq;
                    true
                });
                if applied {
                    debug!("Feed load #{} applied ({} comments)", seq, count);
                } else {
                    debug!("Feed load #{} superseded by a newer load", seq);
                }
                Ok(())
            }
            Err(e) => {
                warn!("Feed load #{} failed: {:#}", seq, e);
                let applied = self.state.send_if_modified(|s| {
                    if seq <= s.revision {
                        return false;
                    }
                    s.status = FeedStatus::Unavailable;
                    s.revision = seq;
                    true
                });
                if applied {
                    self.notices.publish(Notice::error(
                        "Comments unavailable",
                        Some("Could not load comments, please try again.".to_string()),
                    ));
                }
                Err(FeedError::store(&e))
            }
        }
    }

    // 作者名查询必须等评论列表返回之后才能发出
    async fn fetch_and_join(&self) -> anyhow::Result<Vec<Comment>> {
        let stored = self.store.list_comments().await?;

        let ids: BTreeSet<AuthorId> = stored.iter().map(|c| c.author_id.clone()).collect();
        let names: HashMap<AuthorId, String> = if ids.is_empty() {
            HashMap::new()
        } else {
            self.store.lookup_display_names(&ids).await?
        };

        let mut comments: Vec<Comment> = stored
            .into_iter()
            .map(|c| {
                let name = names.get(&c.author_id).cloned();
                Comment::from_stored(c, name)
            })
            .collect();
        sort_newest_first(&mut comments);
        Ok(comments)
    }

    async fn submit_comment(&self, raw: &str) -> Result<CommentId, FeedError> {
        let text = match CommentText::parse(raw) {
            Ok(t) => t,
            Err(e) => {
                debug!("Rejected blank comment");
                self.notices.publish(Notice::error("Comment cannot be empty", None));
                return Err(e);
            }
        };

        let Some(identity) = self.identity.current_identity() else {
            debug!("Comment submitted while signed out, asking for login");
            self.prompts.request(AuthMode::Login);
            self.notices.publish(Notice::error(
                "Please log in",
                Some("You need to be logged in to post a comment".to_string()),
            ));
            return Err(FeedError::AuthenticationRequired);
        };

        let Some(_guard) = SubmitGuard::acquire(self) else {
            debug!("Comment submitted while another is in flight");
            return Err(FeedError::Busy);
        };

        let new_comment = NewComment {
            text,
            author_id: identity.id,
        };
        match self.store.insert_comment(new_comment).await {
            Ok(stored) => {
                info!("Comment {} submitted by {}", stored.id, stored.author_id);
                // 提交期间用户可能继续输入，只清掉刚提交的那段
                self.state.send_if_modified(|s| {
                    if s.draft.trim() != raw.trim() {
                        return false;
                    }
                    s.draft.clear();
                    true
                });
                self.notices.publish(Notice::info(
                    "Comment posted",
                    "Your comment has been added successfully!",
                ));
                Ok(stored.id)
            }
            Err(e) => {
                warn!("Comment submission failed: {:#}", e);
                self.state.send_modify(|s| s.draft = raw.to_string());
                self.notices.publish(Notice::error(
                    "Comment not posted",
                    Some("Something went wrong, your text was kept so you can retry.".to_string()),
                ));
                Err(FeedError::store(&e))
            }
        }
    }
}

/// At most one insert in flight per controller. Released on drop, so an
/// error or a cancelled future never leaves the controller stuck.
struct SubmitGuard<'a> {
    inner: &'a Inner,
}

impl<'a> SubmitGuard<'a> {
    fn acquire(inner: &'a Inner) -> Option<Self> {
        inner
            .submitting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        inner.state.send_modify(|s| s.submitting = true);
        Some(Self { inner })
    }
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.inner.submitting.store(false, Ordering::SeqCst);
        self.inner.state.send_modify(|s| s.submitting = false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use crate::signals::NoticeKind;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDateTime};
    use domain::{identity::AuthorLabel, AuthRequest, ChangeEvent, Identity, StoredComment};
    use std::sync::atomic::{AtomicI64, AtomicUsize};
    use std::time::Duration;
    use tokio::sync::{broadcast, oneshot};

    fn at(secs: i64) -> NaiveDateTime {
        DateTime::from_timestamp(1_744_700_000 + secs, 0)
            .unwrap()
            .naive_utc()
    }

    fn author(s: &str) -> AuthorId {
        AuthorId::new(s).unwrap()
    }

    struct FakeStore {
        comments: Mutex<Vec<StoredComment>>,
        names: Mutex<HashMap<AuthorId, String>>,
        next_id: AtomicI64,
        list_calls: AtomicUsize,
        lookup_calls: AtomicUsize,
        insert_calls: AtomicUsize,
        last_lookup: Mutex<Vec<AuthorId>>,
        fail_list: AtomicBool,
        fail_insert: AtomicBool,
        list_holds: Mutex<HashMap<usize, oneshot::Receiver<()>>>,
        insert_hold: Mutex<Option<oneshot::Receiver<()>>>,
        changes: broadcast::Sender<ChangeEvent>,
    }

    impl FakeStore {
        fn new() -> Arc<Self> {
            let (changes, _rx) = broadcast::channel(16);
            Arc::new(Self {
                comments: Mutex::new(Vec::new()),
                names: Mutex::new(HashMap::new()),
                next_id: AtomicI64::new(1),
                list_calls: AtomicUsize::new(0),
                lookup_calls: AtomicUsize::new(0),
                insert_calls: AtomicUsize::new(0),
                last_lookup: Mutex::new(Vec::new()),
                fail_list: AtomicBool::new(false),
                fail_insert: AtomicBool::new(false),
                list_holds: Mutex::new(HashMap::new()),
                insert_hold: Mutex::new(None),
                changes,
            })
        }

        fn seed(&self, text: &str, author_id: &str, created_at: NaiveDateTime) -> StoredComment {
            let comment = StoredComment {
                id: CommentId::new(self.next_id.fetch_add(1, Ordering::SeqCst)),
                text: text.to_string(),
                created_at,
                author_id: author(author_id),
            };
            self.comments.lock().unwrap().push(comment.clone());
            comment
        }

        fn set_name(&self, author_id: &str, name: &str) {
            self.names
                .lock()
                .unwrap()
                .insert(author(author_id), name.to_string());
        }

        /// The n-th list call (1-based) blocks until the sender fires.
        fn hold_list_call(&self, n: usize) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.list_holds.lock().unwrap().insert(n, rx);
            tx
        }

        fn hold_next_insert(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            *self.insert_hold.lock().unwrap() = Some(rx);
            tx
        }

        fn notify(&self) {
            let _ = self.changes.send(ChangeEvent::Resync);
        }

        fn list_calls(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }

        fn lookup_calls(&self) -> usize {
            self.lookup_calls.load(Ordering::SeqCst)
        }

        fn insert_calls(&self) -> usize {
            self.insert_calls.load(Ordering::SeqCst)
        }

        fn subscribers(&self) -> usize {
            self.changes.receiver_count()
        }
    }

    #[async_trait]
    impl CommentStore for FakeStore {
        async fn list_comments(&self) -> Result<Vec<StoredComment>> {
            let n = self.list_calls.fetch_add(1, Ordering::SeqCst) + 1;
            let mut snapshot = self.comments.lock().unwrap().clone();
            snapshot.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

            let hold = self.list_holds.lock().unwrap().remove(&n);
            if let Some(rx) = hold {
                let _ = rx.await;
            }
            if self.fail_list.load(Ordering::SeqCst) {
                bail!("connection refused");
            }
            Ok(snapshot)
        }

        async fn lookup_display_names(
            &self,
            ids: &BTreeSet<AuthorId>,
        ) -> Result<HashMap<AuthorId, String>> {
            self.lookup_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_lookup.lock().unwrap() = ids.iter().cloned().collect();
            let names = self.names.lock().unwrap();
            Ok(ids
                .iter()
                .filter_map(|id| names.get(id).map(|n| (id.clone(), n.clone())))
                .collect())
        }

        async fn insert_comment(&self, comment: NewComment) -> Result<StoredComment> {
            self.insert_calls.fetch_add(1, Ordering::SeqCst);
            let hold = self.insert_hold.lock().unwrap().take();
            if let Some(rx) = hold {
                let _ = rx.await;
            }
            if self.fail_insert.load(Ordering::SeqCst) {
                bail!("store timed out");
            }
            let id = self.next_id.load(Ordering::SeqCst);
            let stored = self.seed(
                comment.text.as_str(),
                comment.author_id.as_str(),
                at(1_000 + id),
            );
            let _ = self.changes.send(ChangeEvent::CommentInserted { id: stored.id });
            Ok(stored)
        }

        async fn subscribe(&self) -> Result<Subscription> {
            Ok(Subscription::from_broadcast(self.changes.subscribe()))
        }
    }

    struct Harness {
        store: Arc<FakeStore>,
        session: Session,
        prompts: AuthPrompts,
        notices: Notices,
        controller: FeedController,
    }

    fn harness() -> Harness {
        let store = FakeStore::new();
        let session = Session::new();
        let prompts = AuthPrompts::new();
        let notices = Notices::new();
        let controller = FeedController::new(
            store.clone(),
            Arc::new(session.clone()),
            prompts.clone(),
            notices.clone(),
        );
        Harness {
            store,
            session,
            prompts,
            notices,
            controller,
        }
    }

    fn sign_in(session: &Session, id: &str) {
        session.set(Some(Identity {
            id: author(id),
            display_name: None,
            email: Some(format!("{}@example.com", id)),
        }));
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    async fn wait_for_state(
        controller: &FeedController,
        mut pred: impl FnMut(&FeedState) -> bool,
    ) -> FeedState {
        let mut rx = controller.watch();
        let state = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| pred(s)))
            .await
            .expect("state not reached in time")
            .expect("state channel closed")
            .clone();
        state
    }

    fn texts(state: &FeedState) -> Vec<&str> {
        state.comments.iter().map(|c| c.text.as_str()).collect()
    }

    #[tokio::test]
    async fn load_orders_newest_first() {
        let h = harness();
        h.store.seed("A", "u1", at(3));
        h.store.seed("B", "u2", at(1));
        h.store.seed("C", "u1", at(2));

        h.controller.load_feed().await.unwrap();

        let state = h.controller.state();
        assert_eq!(texts(&state), vec!["A", "C", "B"]);
        assert_eq!(state.status, FeedStatus::Ready);
        assert!(matches!(state.view(), FeedView::Comments(c) if c.len() == 3));
    }

    #[tokio::test]
    async fn equal_timestamps_keep_store_order() {
        let h = harness();
        h.store.seed("older insert", "u1", at(5));
        h.store.seed("newer insert", "u1", at(5));
        h.store.seed("latest", "u1", at(9));

        h.controller.load_feed().await.unwrap();

        let state = h.controller.state();
        assert_eq!(texts(&state), vec!["latest", "newer insert", "older insert"]);
    }

    #[tokio::test]
    async fn empty_store_is_not_an_error() {
        let h = harness();
        assert_eq!(h.controller.state().view(), FeedView::Loading);

        h.controller.load_feed().await.unwrap();

        let state = h.controller.state();
        assert_eq!(state.view(), FeedView::NoCommentsYet);
        assert_eq!(h.store.lookup_calls(), 0);
    }

    #[tokio::test]
    async fn display_names_are_joined_with_one_lookup() {
        let h = harness();
        h.store.seed("first", "u1", at(1));
        h.store.seed("second", "u2", at(2));
        h.store.seed("third", "u1", at(3));
        h.store.set_name("u2", "John Smith");

        h.controller.load_feed().await.unwrap();

        assert_eq!(h.store.lookup_calls(), 1);
        assert_eq!(
            *h.store.last_lookup.lock().unwrap(),
            vec![author("u1"), author("u2")]
        );

        let state = h.controller.state();
        let second = state.comments.iter().find(|c| c.text == "second").unwrap();
        assert_eq!(second.author_display_name.as_deref(), Some("John Smith"));
        let label = AuthorLabel::resolve(second.author_display_name.as_deref(), None);
        assert_eq!(label.badge, 'J');
    }

    #[tokio::test]
    async fn unresolved_author_is_anonymous() {
        let h = harness();
        h.store.seed("who am i", "ghost", at(1));

        h.controller.load_feed().await.unwrap();

        let state = h.controller.state();
        let comment = &state.comments[0];
        assert_eq!(comment.author_display_name, None);
        let label = AuthorLabel::resolve(comment.author_display_name.as_deref(), None);
        assert_eq!(label.name, "Anonymous");
        assert_eq!(label.badge, domain::identity::PLACEHOLDER_BADGE);
    }

    #[tokio::test]
    async fn failed_load_keeps_last_snapshot() {
        let h = harness();
        let mut notices = h.notices.subscribe();
        h.store.seed("kept", "u1", at(1));
        h.controller.load_feed().await.unwrap();

        h.store.fail_list.store(true, Ordering::SeqCst);
        h.store.seed("not seen", "u1", at(2));
        let err = h.controller.load_feed().await.unwrap_err();
        assert!(matches!(err, FeedError::StoreUnavailable(_)));
        assert!(err.is_retryable());

        let state = h.controller.state();
        assert_eq!(state.status, FeedStatus::Unavailable);
        assert!(matches!(state.view(), FeedView::Unavailable(c) if c.len() == 1 && c[0].text == "kept"));

        let notice = notices.try_recv().unwrap();
        assert_eq!(notice.kind, NoticeKind::Error);
    }

    #[tokio::test]
    async fn first_load_failure_leaves_feed_empty() {
        let h = harness();
        h.store.fail_list.store(true, Ordering::SeqCst);

        assert!(h.controller.load_feed().await.is_err());

        let state = h.controller.state();
        assert_eq!(state.view(), FeedView::Unavailable(&[]));
    }

    #[tokio::test]
    async fn blank_submission_never_reaches_the_store() {
        let h = harness();
        sign_in(&h.session, "u1");
        let before = h.controller.state();

        for text in ["", "   ", "\n\t  "] {
            let err = h.controller.submit_comment(text).await.unwrap_err();
            assert!(matches!(err, FeedError::Validation(_)));
            assert!(!err.is_retryable());
        }

        assert_eq!(h.store.insert_calls(), 0);
        assert_eq!(h.store.list_calls(), 0);
        assert_eq!(h.store.lookup_calls(), 0);
        let after = h.controller.state();
        assert_eq!(after.comments, before.comments);
        assert_eq!(after.revision, before.revision);
    }

    #[tokio::test]
    async fn signed_out_submission_prompts_login_once() {
        let h = harness();
        let mut prompts = h.prompts.subscribe();

        let err = h.controller.submit_comment("hello").await.unwrap_err();

        assert_eq!(err, FeedError::AuthenticationRequired);
        assert_eq!(
            prompts.try_recv().unwrap(),
            AuthRequest {
                mode: AuthMode::Login
            }
        );
        assert!(prompts.try_recv().is_err());
        assert_eq!(h.store.insert_calls(), 0);
        assert!(h.store.comments.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn submitted_comment_arrives_through_live_update() {
        let h = harness();
        sign_in(&h.session, "u1");
        h.controller.start().await.unwrap();
        h.controller.set_draft("  hi there  ");

        h.controller.submit_comment("  hi there  ").await.unwrap();

        let state = h.controller.state();
        assert!(state.comments.is_empty(), "comment must not be spliced in locally");
        assert_eq!(state.draft, "");
        assert!(!state.submitting);

        let state = wait_for_state(&h.controller, |s| s.comments.len() == 1).await;
        assert_eq!(state.comments[0].text, "hi there");
        assert_eq!(state.comments[0].author_id, author("u1"));
        assert_eq!(h.store.insert_calls(), 1);

        h.controller.shutdown().await;
    }

    #[tokio::test]
    async fn concurrent_submission_is_busy() {
        let h = harness();
        sign_in(&h.session, "u1");
        let release = h.store.hold_next_insert();

        let first = h.controller.submit_comment("one");
        let second = async {
            eventually(|| h.store.insert_calls() == 1).await;
            assert!(h.controller.state().submitting);
            let res = h.controller.submit_comment("two").await;
            release.send(()).unwrap();
            res
        };
        let (first, second) = tokio::join!(first, second);

        assert!(first.is_ok());
        assert_eq!(second, Err(FeedError::Busy));
        assert_eq!(h.store.insert_calls(), 1);
        assert_eq!(h.store.comments.lock().unwrap().len(), 1);

        h.controller.submit_comment("three").await.unwrap();
        assert_eq!(h.store.insert_calls(), 2);
    }

    #[tokio::test]
    async fn failed_submission_keeps_the_draft() {
        let h = harness();
        sign_in(&h.session, "u1");
        let mut notices = h.notices.subscribe();
        h.store.fail_insert.store(true, Ordering::SeqCst);
        h.controller.set_draft("my thoughts");

        let err = h.controller.submit_comment("my thoughts").await.unwrap_err();

        assert!(matches!(err, FeedError::StoreUnavailable(_)));
        let state = h.controller.state();
        assert_eq!(state.draft, "my thoughts");
        assert!(!state.submitting);
        assert_eq!(notices.try_recv().unwrap().kind, NoticeKind::Error);

        h.store.fail_insert.store(false, Ordering::SeqCst);
        h.controller.submit_comment("my thoughts").await.unwrap();
        assert_eq!(h.controller.state().draft, "");
    }

    #[tokio::test]
    async fn draft_typed_during_submission_survives() {
        let h = harness();
        sign_in(&h.session, "u1");
        let release = h.store.hold_next_insert();
        h.controller.set_draft("first thought");

        let submit = h.controller.submit_comment("first thought");
        let typing = async {
            eventually(|| h.store.insert_calls() == 1).await;
            h.controller.set_draft("second thought");
            release.send(()).unwrap();
        };
        let (res, ()) = tokio::join!(submit, typing);

        assert!(res.is_ok());
        assert_eq!(h.controller.state().draft, "second thought");
    }

    #[tokio::test]
    async fn change_during_load_triggers_exactly_one_more_load() {
        let h = harness();
        h.controller.start().await.unwrap();
        assert_eq!(h.store.list_calls(), 1);

        let release = h.store.hold_list_call(2);
        let load = h.controller.load_feed();
        let driver = async {
            eventually(|| h.store.list_calls() == 2).await;
            h.store.seed("arrived mid-load", "u2", at(10));
            h.store.notify();
            eventually(|| h.store.list_calls() == 3).await;
            wait_for_state(&h.controller, |s| s.revision == 3).await;
            release.send(()).unwrap();
        };
        let (res, ()) = tokio::join!(load, driver);
        assert!(res.is_ok());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.store.list_calls(), 3);

        // load #2 started before the insert and finished last; it must not
        // roll the feed back
        let state = h.controller.state();
        assert_eq!(state.revision, 3);
        assert_eq!(texts(&state), vec!["arrived mid-load"]);

        h.controller.shutdown().await;
    }

    #[tokio::test]
    async fn stale_failure_does_not_mark_feed_unavailable() {
        let h = harness();
        let release = h.store.hold_list_call(1);

        let slow = h.controller.load_feed();
        let fast = async {
            eventually(|| h.store.list_calls() == 1).await;
            h.store.seed("fresh", "u1", at(1));
            h.controller.load_feed().await.unwrap();
            h.store.fail_list.store(true, Ordering::SeqCst);
            release.send(()).unwrap();
        };
        let (slow, ()) = tokio::join!(slow, fast);

        assert!(slow.is_err());
        let state = h.controller.state();
        assert_eq!(state.status, FeedStatus::Ready);
        assert_eq!(texts(&state), vec!["fresh"]);
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let h = harness();
        h.controller.start().await.unwrap();
        assert_eq!(h.controller.start().await, Err(FeedError::AlreadyStarted));
        assert_eq!(h.store.subscribers(), 1);
        h.controller.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_releases_subscription() {
        let h = harness();
        h.controller.start().await.unwrap();
        assert_eq!(h.store.subscribers(), 1);

        h.controller.shutdown().await;

        assert!(!h.controller.is_active());
        eventually(|| h.store.subscribers() == 0).await;
    }

    #[tokio::test]
    async fn dropping_controller_releases_subscription() {
        let h = harness();
        h.controller.start().await.unwrap();
        let store = h.store.clone();
        assert_eq!(store.subscribers(), 1);

        drop(h);

        eventually(|| store.subscribers() == 0).await;
    }

    #[tokio::test]
    async fn loads_after_teardown_are_discarded() {
        let h = harness();
        h.controller.start().await.unwrap();
        let revision = h.controller.state().revision;
        h.controller.shutdown().await;

        h.store.seed("too late", "u1", at(1));
        h.controller.load_feed().await.unwrap();

        let state = h.controller.state();
        assert_eq!(state.revision, revision);
        assert!(state.comments.is_empty());
    }
}
