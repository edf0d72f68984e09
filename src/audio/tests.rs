use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::{Notify, oneshot};

use crate::config::Settings;
use crate::error::{CommandError, NotifyError, PlayError, ResolutionError, SinkError};
use crate::library::{MediaLocator, Resolution, SourceKey, Track, TrackResolver};
use crate::notify::{LeaveReason, Notice, Notifier, ProgressView};

use super::looping::apply_loop_mode;
use super::queue::{EnqueueOutcome, PlaybackQueue};
use super::sink::{EndReason, PlaybackEnd, VoiceSink, VoiceSinkFactory};
use super::*;

const GUILD: GuildId = GuildId(7);
const CHANNEL: ChannelId = ChannelId(70);

fn track(id: &str) -> Track {
    Track::new(
        SourceKey::new("test", id),
        id.to_uppercase(),
        MediaLocator::borrowed(format!("/music/{id}.mp3")),
    )
}

fn titles<'a>(q: impl Iterator<Item = &'a Track>) -> Vec<String> {
    q.map(|t| t.title.clone()).collect()
}

// ---- queue and loop controller ----

#[test]
fn enqueue_rejects_queued_and_current_sources() {
    let mut q = PlaybackQueue::new();
    assert!(matches!(q.enqueue(track("a"), None), Ok(EnqueueOutcome::Added)));

    let dup = q.enqueue(track("a"), None);
    assert!(matches!(dup, Err(ref t) if t.title == "A"));

    let current = SourceKey::new("test", "b");
    assert!(q.enqueue(track("b"), Some(&current)).is_err());
    assert_eq!(q.len(), 1);
}

#[test]
fn dequeue_on_empty_queue_is_a_no_op() {
    let mut q = PlaybackQueue::new();
    assert!(q.dequeue().is_none());
    assert!(q.dequeue().is_none());
    assert!(q.is_empty());
}

#[test]
fn shuffle_keeps_membership() {
    let mut q = PlaybackQueue::new();
    for id in ["a", "b", "c", "d", "e"] {
        let _ = q.enqueue(track(id), None);
    }
    q.shuffle();
    let mut got = titles(q.iter());
    got.sort();
    assert_eq!(got, vec!["A", "B", "C", "D", "E"]);
}

#[test]
fn loop_off_hands_the_track_back() {
    let mut q = PlaybackQueue::new();
    let gone = apply_loop_mode(track("a"), LoopMode::Off, &mut q);
    assert_eq!(gone.map(|t| t.title), Some("A".to_string()));
    assert!(q.is_empty());
}

#[test]
fn loop_track_requeues_at_head_and_loop_queue_at_tail() {
    let mut q = PlaybackQueue::new();
    let _ = q.enqueue(track("b"), None);

    assert!(apply_loop_mode(track("a"), LoopMode::Track, &mut q).is_none());
    assert_eq!(titles(q.iter()), vec!["A", "B"]);

    let head = q.dequeue();
    assert!(head.is_some());
    assert!(apply_loop_mode(track("c"), LoopMode::Queue, &mut q).is_none());
    assert_eq!(titles(q.iter()), vec!["B", "C"]);
}

#[test]
fn loop_queue_restores_order_after_full_cycle() {
    let mut q = PlaybackQueue::new();
    for id in ["a", "b", "c"] {
        let _ = q.enqueue(track(id), None);
    }
    for _ in 0..3 {
        let Some(t) = q.dequeue() else {
            panic!("queue drained under loop queue");
        };
        assert!(apply_loop_mode(t, LoopMode::Queue, &mut q).is_none());
    }
    assert_eq!(titles(q.iter()), vec!["A", "B", "C"]);
}

#[test]
fn loop_mode_parses_case_insensitively() {
    assert_eq!("TRACK".parse::<LoopMode>(), Ok(LoopMode::Track));
    assert_eq!(" queue ".parse::<LoopMode>(), Ok(LoopMode::Queue));
    assert_eq!(
        "sometimes".parse::<LoopMode>(),
        Err(CommandError::InvalidLoopMode("sometimes".to_string()))
    );
}

// ---- fakes ----

#[derive(Default)]
struct SinkState {
    channel: Option<ChannelId>,
    current: Option<oneshot::Sender<EndReason>>,
    started: Vec<PathBuf>,
    fail_next: bool,
    hold_connect: bool,
    stops: usize,
    disconnects: usize,
}

#[derive(Default)]
struct FakeSink {
    state: Mutex<SinkState>,
    connecting: Notify,
    connect_gate: Notify,
}

impl FakeSink {
    fn finish(&self) {
        self.end(EndReason::Finished);
    }

    fn end(&self, reason: EndReason) {
        let done = self.take_current();
        done.expect("nothing playing").send(reason).unwrap();
    }

    /// Detach the completion of the current track, as a sink that loses it would.
    fn take_current(&self) -> Option<oneshot::Sender<EndReason>> {
        self.state.lock().unwrap().current.take()
    }

    /// The next `connect` waits on `connect_gate` after announcing itself.
    fn hold_next_connect(&self) {
        self.state.lock().unwrap().hold_connect = true;
    }

    fn fail_next_play(&self) {
        self.state.lock().unwrap().fail_next = true;
    }

    fn started(&self) -> usize {
        self.state.lock().unwrap().started.len()
    }

    fn channel(&self) -> Option<ChannelId> {
        self.state.lock().unwrap().channel
    }
}

#[async_trait]
impl VoiceSink for FakeSink {
    async fn connect(&self, channel: ChannelId) -> Result<(), SinkError> {
        let hold = std::mem::take(&mut self.state.lock().unwrap().hold_connect);
        if hold {
            self.connecting.notify_one();
            self.connect_gate.notified().await;
        }
        self.state.lock().unwrap().channel = Some(channel);
        Ok(())
    }

    async fn play(&self, media: &MediaLocator) -> Result<PlaybackEnd, SinkError> {
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.fail_next) {
            return Err(SinkError::Decode {
                path: media.path().to_path_buf(),
                reason: "not audio".into(),
            });
        }
        if let Some(old) = state.current.take() {
            let _ = old.send(EndReason::Stopped);
        }
        let (tx, rx) = oneshot::channel();
        state.current = Some(tx);
        state.started.push(media.path().to_path_buf());
        Ok(rx)
    }

    async fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        state.stops += 1;
        if let Some(old) = state.current.take() {
            let _ = old.send(EndReason::Stopped);
        }
    }

    fn is_playing(&self) -> bool {
        self.state.lock().unwrap().current.is_some()
    }

    async fn disconnect(&self) {
        let mut state = self.state.lock().unwrap();
        state.disconnects += 1;
        state.channel = None;
        state.current = None;
    }
}

struct FakeSinks(Arc<FakeSink>);

impl VoiceSinkFactory for FakeSinks {
    fn open(&self, _guild: GuildId) -> Arc<dyn VoiceSink> {
        self.0.clone()
    }
}

#[derive(Default)]
struct FakeNotifier {
    notices: Mutex<Vec<Notice>>,
    edits: Mutex<Vec<ProgressView>>,
    fail_edits: bool,
}

impl FakeNotifier {
    fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    fn edit_count(&self) -> usize {
        self.edits.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn send(&self, _guild: GuildId, notice: Notice) -> Result<(), NotifyError> {
        self.notices.lock().unwrap().push(notice);
        Ok(())
    }

    async fn edit_progress(
        &self,
        _guild: GuildId,
        progress: &ProgressView,
    ) -> Result<(), NotifyError> {
        self.edits.lock().unwrap().push(progress.clone());
        if self.fail_edits {
            Err(NotifyError::NoProgressMessage)
        } else {
            Ok(())
        }
    }
}

/// Resolves `"a"` to one track, `"a,b,c"` to a playlist. Every track is
/// "downloaded" as an empty file into the request directory; `"x@a"` is source
/// `x` downloaded as `a.mp3`. `slow` waits on `gate` before returning.
#[derive(Default)]
struct FakeResolver {
    durations: HashMap<String, u64>,
    entered: Notify,
    gate: Notify,
}

#[async_trait]
impl TrackResolver for FakeResolver {
    async fn resolve(&self, url: &str, dest: &Path) -> Result<Resolution, ResolutionError> {
        let (ids, slow) = match url.strip_prefix("slow:") {
            Some(rest) => (rest, true),
            None => (url, false),
        };
        if ids.is_empty() || ids.contains('/') {
            return Err(ResolutionError::Unsupported(url.to_string()));
        }

        std::fs::create_dir_all(dest)?;
        let mut tracks = Vec::new();
        for entry in ids.split(',') {
            let (id, file) = entry.split_once('@').unwrap_or((entry, entry));
            let path = dest.join(format!("{file}.mp3"));
            std::fs::write(&path, b"")?;
            let t = Track::new(
                SourceKey::new("test", id),
                id.to_uppercase(),
                MediaLocator::downloaded(path),
            )
            .with_duration(self.durations.get(id).copied().unwrap_or(0));
            tracks.push(t);
        }

        if slow {
            self.entered.notify_one();
            self.gate.notified().await;
        }
        Ok(Resolution {
            playlist_title: (tracks.len() > 1).then(|| "Mix".to_string()),
            tracks,
        })
    }
}

struct Harness {
    jukebox: Arc<Jukebox>,
    sink: Arc<FakeSink>,
    notifier: Arc<FakeNotifier>,
    resolver: Arc<FakeResolver>,
    media: TempDir,
}

impl Harness {
    fn guild_dir(&self) -> PathBuf {
        self.media.path().join(GUILD.to_string())
    }

    fn request_file(&self, request: u64, id: &str) -> PathBuf {
        self.guild_dir()
            .join(format!("req-{request}"))
            .join(format!("{id}.mp3"))
    }

    async fn play(&self, url: &str) -> Result<EnqueueReport, PlayError> {
        self.jukebox.play(GUILD, CHANNEL, url).await
    }

    async fn snapshot(&self) -> QueueSnapshot {
        self.jukebox.list_queue(GUILD).await.unwrap()
    }

    async fn now_title(&self) -> Option<String> {
        self.snapshot().await.now_playing.map(|t| t.title)
    }

    async fn upcoming_titles(&self) -> Vec<String> {
        self.snapshot()
            .await
            .upcoming
            .into_iter()
            .map(|t| t.title)
            .collect()
    }

    /// Poll the session until `pred` holds.
    async fn wait_for(&self, pred: impl Fn(&QueueSnapshot) -> bool) -> QueueSnapshot {
        for _ in 0..200 {
            let snap = self.snapshot().await;
            if pred(&snap) {
                return snap;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session never reached the expected state");
    }
}

fn harness_with(
    configure: impl FnOnce(&mut Settings),
    resolver: FakeResolver,
    notifier: FakeNotifier,
) -> Harness {
    let media = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.media.root = media.path().to_path_buf();
    // Keep the reporter out of the way unless a test asks for it.
    settings.playback.progress_interval_ms = 3_600_000;
    configure(&mut settings);

    let sink = Arc::new(FakeSink::default());
    let notifier = Arc::new(notifier);
    let resolver = Arc::new(resolver);
    let jukebox = Jukebox::new(
        EngineSettings::from_settings(&settings),
        resolver.clone(),
        Arc::new(FakeSinks(sink.clone())),
        notifier.clone(),
    );
    Harness {
        jukebox: Arc::new(jukebox),
        sink,
        notifier,
        resolver,
        media,
    }
}

fn harness() -> Harness {
    harness_with(|_| {}, FakeResolver::default(), FakeNotifier::default())
}

// ---- session ----

#[tokio::test]
async fn second_play_queues_and_skip_advances() {
    let h = harness();

    let first = h.play("a").await.unwrap();
    assert_eq!(first.started.map(|t| t.title), Some("A".to_string()));
    assert_eq!(h.sink.channel(), Some(CHANNEL));

    let second = h.play("b").await.unwrap();
    assert!(second.started.is_none());
    assert_eq!(second.added.len(), 1);
    assert_eq!(h.now_title().await.as_deref(), Some("A"));
    assert_eq!(h.upcoming_titles().await, vec!["B"]);

    let skip = h.jukebox.skip(GUILD).await.unwrap();
    assert_eq!(skip.skipped.title, "A");
    assert_eq!(skip.next.map(|t| t.title), Some("B".to_string()));
    assert_eq!(h.now_title().await.as_deref(), Some("B"));
    assert!(h.upcoming_titles().await.is_empty());

    // A was downloaded for this guild and is gone once skipped.
    assert!(!h.request_file(1, "a").exists());
    assert!(h.request_file(2, "b").exists());
}

#[tokio::test]
async fn duplicate_sources_are_refused_and_reclaimed() {
    let h = harness();
    h.play("a").await.unwrap();
    h.play("b").await.unwrap();

    let again = h.play("b").await.unwrap();
    assert!(again.added.is_empty());
    assert_eq!(again.duplicates.len(), 1);
    assert!(!h.request_file(3, "b").exists());

    // The current track counts too.
    let current = h.play("a").await.unwrap();
    assert_eq!(current.duplicates.len(), 1);
    assert_eq!(h.upcoming_titles().await, vec!["B"]);
}

#[tokio::test]
async fn playlist_keeps_order_and_reports_title() {
    let h = harness();
    let report = h.play("a,b,c").await.unwrap();
    assert_eq!(report.playlist_title.as_deref(), Some("Mix"));
    assert_eq!(report.added.len(), 3);
    assert_eq!(h.upcoming_titles().await, vec!["B", "C"]);
}

#[tokio::test]
async fn loop_off_drains_queue_to_idle() {
    let h = harness();
    h.play("a,b,c").await.unwrap();

    for next in ["B", "C"] {
        h.sink.finish();
        h.wait_for(|s| s.now_playing.as_ref().is_some_and(|t| t.title == next))
            .await;
    }
    h.sink.finish();
    let snap = h.wait_for(|s| s.is_idle()).await;
    assert!(snap.upcoming.is_empty());
    assert!(h.notifier.notices().contains(&Notice::QueueEmpty));
}

#[tokio::test]
async fn loop_track_keeps_replaying_the_same_track() {
    let h = harness();
    h.jukebox.set_loop_mode(GUILD, "track").await.unwrap();
    h.play("a").await.unwrap();
    let first = h.snapshot().await.now_playing.unwrap().id;

    for round in 1..=3 {
        h.sink.finish();
        while h.sink.started() <= round {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(h.snapshot().await.now_playing.map(|t| t.id), Some(first));
    }
    assert!(h.upcoming_titles().await.is_empty());
}

#[tokio::test]
async fn loop_queue_rotates_through_tracks() {
    let h = harness();
    h.jukebox.set_loop_mode(GUILD, "queue").await.unwrap();
    h.play("a,b").await.unwrap();
    let ids = {
        let snap = h.snapshot().await;
        (snap.now_playing.unwrap().id, snap.upcoming[0].id)
    };

    h.sink.finish();
    let snap = h
        .wait_for(|s| s.now_playing.as_ref().is_some_and(|t| t.title == "B"))
        .await;
    assert_eq!(snap.upcoming_ids(), vec![ids.0]);

    h.sink.finish();
    let snap = h
        .wait_for(|s| s.now_playing.as_ref().is_some_and(|t| t.title == "A"))
        .await;
    assert_eq!(snap.now_playing.as_ref().map(|t| t.id), Some(ids.0));
    assert_eq!(snap.upcoming_ids(), vec![ids.1]);
}

#[tokio::test]
async fn skip_can_bypass_loop_mode() {
    let h = harness_with(
        |s| s.playback.skip_respects_loop = false,
        FakeResolver::default(),
        FakeNotifier::default(),
    );
    h.jukebox.set_loop_mode(GUILD, "track").await.unwrap();
    h.play("a").await.unwrap();

    let skip = h.jukebox.skip(GUILD).await.unwrap();
    assert!(skip.next.is_none());
    assert!(h.snapshot().await.is_idle());
}

#[tokio::test]
async fn skip_under_loop_track_replays_by_default() {
    let h = harness();
    h.jukebox.set_loop_mode(GUILD, "track").await.unwrap();
    h.play("a,b").await.unwrap();

    let skip = h.jukebox.skip(GUILD).await.unwrap();
    assert_eq!(skip.skipped.title, "A");
    assert_eq!(skip.next.map(|t| t.title), Some("A".to_string()));
    assert_eq!(h.upcoming_titles().await, vec!["B"]);
    assert_eq!(h.sink.started(), 2);
    assert!(h.request_file(1, "a").exists());
}

#[tokio::test]
async fn loop_mode_change_applies_at_the_next_completion() {
    let h = harness();
    h.jukebox.set_loop_mode(GUILD, "track").await.unwrap();
    h.play("a,b").await.unwrap();

    h.jukebox.set_loop_mode(GUILD, "queue").await.unwrap();
    assert_eq!(h.now_title().await.as_deref(), Some("A"));
    assert_eq!(h.upcoming_titles().await, vec!["B"]);

    h.sink.finish();
    h.wait_for(|s| s.now_playing.as_ref().is_some_and(|t| t.title == "B"))
        .await;
    assert_eq!(h.upcoming_titles().await, vec!["A"]);

    h.jukebox.set_loop_mode(GUILD, "off").await.unwrap();
    h.sink.finish();
    h.wait_for(|s| s.now_playing.as_ref().is_some_and(|t| t.title == "A"))
        .await;
    assert!(h.upcoming_titles().await.is_empty());
    assert!(!h.request_file(1, "b").exists());
}

#[tokio::test]
async fn skip_when_idle_is_an_error() {
    let h = harness();
    assert_eq!(
        h.jukebox.skip(GUILD).await.unwrap_err(),
        CommandError::NothingPlaying
    );
    h.jukebox.set_loop_mode(GUILD, "off").await.unwrap();
    assert_eq!(
        h.jukebox.skip(GUILD).await.unwrap_err(),
        CommandError::NothingPlaying
    );
}

#[tokio::test]
async fn stop_clears_everything_and_disconnects() {
    let h = harness();
    h.play("a").await.unwrap();
    h.play("b,c").await.unwrap();

    let report = h.jukebox.stop(GUILD).await.unwrap();
    assert!(report.was_playing);
    assert_eq!(report.cleared, 2);

    let snap = h.snapshot().await;
    assert!(snap.is_idle());
    assert!(snap.upcoming.is_empty());
    assert_eq!(h.sink.channel(), None);
    assert!(!h.request_file(1, "a").exists());
    assert!(!h.request_file(2, "c").exists());
    assert!(h
        .notifier
        .notices()
        .contains(&Notice::Left(LeaveReason::Stopped)));

    // Stopping again is harmless.
    let again = h.jukebox.stop(GUILD).await.unwrap();
    assert!(!again.was_playing);
    assert_eq!(again.cleared, 0);
}

#[tokio::test]
async fn commands_on_unknown_guild_do_not_create_a_session() {
    let h = harness();
    let report = h.jukebox.stop(GUILD).await.unwrap();
    assert!(!report.was_playing);
    assert_eq!(h.jukebox.shuffle(GUILD).await.unwrap(), 0);
    h.jukebox.voice_members(GUILD, 0);
    h.jukebox.voice_lost(GUILD);
    assert!(h.snapshot().await.is_idle());
    assert_eq!(h.sink.started(), 0);
    assert_eq!(h.sink.state.lock().unwrap().disconnects, 0);
}

#[tokio::test]
async fn play_racing_a_stop_is_cancelled() {
    let h = harness();
    let jukebox = h.jukebox.clone();
    let pending = tokio::spawn(async move { jukebox.play(GUILD, CHANNEL, "slow:a").await });

    h.resolver.entered.notified().await;
    h.jukebox.stop(GUILD).await.unwrap();
    h.resolver.gate.notify_one();

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(PlayError::Cancelled)));
    assert!(h.snapshot().await.is_idle());
    assert!(!h.request_file(1, "a").exists());
    assert_eq!(h.sink.started(), 0);

    // A request issued after the stop goes through.
    assert!(h.play("b").await.unwrap().started.is_some());
}

#[tokio::test]
async fn stop_while_joining_leaves_the_channel() {
    let h = harness();
    h.sink.hold_next_connect();
    let jukebox = h.jukebox.clone();
    let pending = tokio::spawn(async move { jukebox.play(GUILD, CHANNEL, "a").await });

    h.sink.connecting.notified().await;
    let report = h.jukebox.stop(GUILD).await.unwrap();
    assert!(!report.was_playing);
    h.sink.connect_gate.notify_one();

    assert!(matches!(pending.await.unwrap(), Err(PlayError::Cancelled)));
    assert_eq!(h.sink.channel(), None);
    assert_eq!(h.sink.started(), 0);

    let next = h.play("b").await.unwrap();
    assert!(next.started.is_some());
    assert_eq!(h.sink.channel(), Some(CHANNEL));
}

#[tokio::test]
async fn repeated_source_in_one_request_keeps_the_shared_file() {
    let h = harness();
    let report = h.play("a,a").await.unwrap();
    assert_eq!(report.added.len(), 1);
    assert_eq!(report.duplicates.len(), 1);
    assert_eq!(h.now_title().await.as_deref(), Some("A"));
    assert!(h.request_file(1, "a").exists());
}

#[tokio::test]
async fn shared_download_outlives_the_first_track_using_it() {
    let h = harness();
    h.play("x@a,y@a").await.unwrap();
    assert_eq!(h.upcoming_titles().await, vec!["Y"]);

    h.sink.finish();
    h.wait_for(|s| s.now_playing.as_ref().is_some_and(|t| t.title == "Y"))
        .await;
    assert!(h.request_file(1, "a").exists());

    h.sink.finish();
    h.wait_for(|s| s.is_idle()).await;
    assert!(!h.request_file(1, "a").exists());
}

#[tokio::test]
async fn resolver_failure_only_fails_that_request() {
    let h = harness();
    h.play("a").await.unwrap();
    assert!(matches!(
        h.play("not/a/url").await,
        Err(PlayError::Resolution(ResolutionError::Unsupported(_)))
    ));
    assert_eq!(h.now_title().await.as_deref(), Some("A"));
}

#[tokio::test]
async fn sink_start_failure_leaves_session_idle() {
    let h = harness();
    h.sink.fail_next_play();

    let report = h.play("a,b").await.unwrap();
    assert!(report.started.is_none());
    assert_eq!(report.added.len(), 2);

    let snap = h.snapshot().await;
    assert!(snap.is_idle());
    assert_eq!(h.upcoming_titles().await, vec!["B"]);
    assert!(!h.request_file(1, "a").exists());
    assert!(
        h.notifier
            .notices()
            .iter()
            .any(|n| matches!(n, Notice::PlaybackFailed { track, .. } if track.title == "A"))
    );

    // The next request picks the queue back up.
    let report = h.play("c").await.unwrap();
    assert_eq!(report.started.map(|t| t.title), Some("B".to_string()));
}

#[tokio::test]
async fn invalid_loop_mode_leaves_mode_unchanged() {
    let h = harness();
    h.jukebox.set_loop_mode(GUILD, "queue").await.unwrap();
    assert_eq!(
        h.jukebox.set_loop_mode(GUILD, "forever").await,
        Err(CommandError::InvalidLoopMode("forever".to_string()))
    );
    assert_eq!(h.snapshot().await.loop_mode, LoopMode::Queue);
}

#[tokio::test]
async fn shuffle_reorders_pending_tracks_only() {
    let h = harness();
    h.play("a,b,c,d,e").await.unwrap();
    assert_eq!(h.jukebox.shuffle(GUILD).await.unwrap(), 4);
    assert_eq!(h.now_title().await.as_deref(), Some("A"));
    let mut pending = h.upcoming_titles().await;
    pending.sort();
    assert_eq!(pending, vec!["B", "C", "D", "E"]);
}

#[tokio::test]
async fn voice_lost_tears_down_and_removes_media() {
    let h = harness();
    h.play("a,b").await.unwrap();
    assert!(h.guild_dir().exists());

    h.jukebox.voice_lost(GUILD);
    h.wait_for(|s| s.is_idle() && s.upcoming.is_empty()).await;
    assert!(!h.guild_dir().exists());
    assert!(h
        .notifier
        .notices()
        .contains(&Notice::Left(LeaveReason::ConnectionLost)));
}

#[tokio::test]
async fn failed_track_leaves_session_idle_with_queue_kept() {
    let h = harness();
    h.play("a,b").await.unwrap();

    h.sink.end(EndReason::Failed("device unplugged".into()));
    let snap = h.wait_for(|s| s.is_idle()).await;
    assert_eq!(snap.upcoming.len(), 1);
    assert_eq!(h.sink.started(), 1);
    assert!(!h.request_file(1, "a").exists());
    assert!(h.request_file(1, "b").exists());
    assert!(h.notifier.notices().iter().any(|n| matches!(
        n,
        Notice::PlaybackFailed { track, reason } if track.title == "A" && reason == "device unplugged"
    )));
}

#[tokio::test]
async fn lost_completion_tears_the_session_down() {
    let h = harness();
    h.play("a,b").await.unwrap();

    drop(h.sink.take_current());
    h.wait_for(|s| s.is_idle() && s.upcoming.is_empty()).await;
    assert_eq!(h.sink.channel(), None);
    assert!(!h.guild_dir().exists());
    assert!(h
        .notifier
        .notices()
        .contains(&Notice::Left(LeaveReason::ConnectionLost)));
}

#[tokio::test(start_paused = true)]
async fn listener_returning_within_grace_keeps_the_session() {
    let h = harness();
    h.play("a").await.unwrap();

    h.jukebox.voice_members(GUILD, 0);
    tokio::time::sleep(Duration::from_secs(5)).await;
    h.jukebox.voice_members(GUILD, 1);
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(h.now_title().await.as_deref(), Some("A"));
    assert_eq!(h.sink.channel(), Some(CHANNEL));
}

#[tokio::test(start_paused = true)]
async fn alone_past_grace_leaves_the_channel() {
    let h = harness();
    h.play("a,b").await.unwrap();

    h.jukebox.voice_members(GUILD, 0);
    tokio::time::sleep(Duration::from_secs(11)).await;

    h.wait_for(|s| s.is_idle() && s.upcoming.is_empty()).await;
    assert_eq!(h.sink.channel(), None);
    assert!(!h.guild_dir().exists());
    assert!(h
        .notifier
        .notices()
        .contains(&Notice::Left(LeaveReason::Abandoned)));
}

#[tokio::test(start_paused = true)]
async fn reporter_advances_when_duration_elapses() {
    let resolver = FakeResolver {
        durations: HashMap::from([("a".to_string(), 3)]),
        ..FakeResolver::default()
    };
    let h = harness_with(
        |s| s.playback.progress_interval_ms = 1000,
        resolver,
        FakeNotifier::default(),
    );
    h.play("a,b").await.unwrap();

    tokio::time::sleep(Duration::from_millis(3500)).await;
    h.wait_for(|s| s.now_playing.as_ref().is_some_and(|t| t.title == "B"))
        .await;
    assert!(h.notifier.edit_count() >= 1);
    assert_eq!(h.sink.started(), 2);
}

#[tokio::test(start_paused = true)]
async fn reporter_restarts_clock_under_loop_track() {
    let resolver = FakeResolver {
        durations: HashMap::from([("a".to_string(), 2)]),
        ..FakeResolver::default()
    };
    let h = harness_with(
        |s| s.playback.progress_interval_ms = 1000,
        resolver,
        FakeNotifier::default(),
    );
    h.jukebox.set_loop_mode(GUILD, "track").await.unwrap();
    h.play("a").await.unwrap();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    let snap = h.snapshot().await;
    assert_eq!(snap.now_playing.map(|t| t.title), Some("A".to_string()));
    assert!(snap.elapsed_secs < 2);
    // Only the sink's own end replays the track.
    assert_eq!(h.sink.started(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_edit_stops_further_edits_for_the_track() {
    let notifier = FakeNotifier {
        fail_edits: true,
        ..FakeNotifier::default()
    };
    let h = harness_with(
        |s| s.playback.progress_interval_ms = 1000,
        FakeResolver::default(),
        notifier,
    );
    h.play("a").await.unwrap();

    tokio::time::sleep(Duration::from_millis(5500)).await;
    assert_eq!(h.notifier.edit_count(), 1);
    // Unknown duration: still playing.
    assert_eq!(h.now_title().await.as_deref(), Some("A"));
}

#[tokio::test(start_paused = true)]
async fn late_sink_end_after_reporter_advance_is_ignored() {
    let resolver = FakeResolver {
        durations: HashMap::from([("a".to_string(), 2)]),
        ..FakeResolver::default()
    };
    let h = harness_with(
        |s| s.playback.progress_interval_ms = 1000,
        resolver,
        FakeNotifier::default(),
    );
    h.play("a,b,c").await.unwrap();
    let a_done = h.sink.take_current().unwrap();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    h.wait_for(|s| s.now_playing.as_ref().is_some_and(|t| t.title == "B"))
        .await;

    a_done.send(EndReason::Finished).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.now_title().await.as_deref(), Some("B"));
    assert_eq!(h.upcoming_titles().await, vec!["C"]);
    assert_eq!(h.sink.started(), 2);
}
