use parking_lot::Mutex;
use serde_json::{Map, json};
use spider_engine::prelude::*;
use spider_engine::{CrawlerState, FileRecord, Item, Response};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

fn url(path: &str) -> url::Url {
    url::Url::parse(&format!("https://example.com{}", path)).unwrap()
}

fn request(path: &str, rule: &str) -> Request {
    Request::new(url(path), rule)
}

/// In-memory request source that counts slots and never retries.
#[derive(Default)]
struct MockSource {
    queue: Mutex<VecDeque<Request>>,
    started: AtomicBool,
    producing: AtomicBool,
    stopping: AtomicBool,
    acquired: AtomicUsize,
    released: AtomicUsize,
    outcomes: Mutex<Vec<(String, bool)>>,
    starts: AtomicUsize,
}

impl MockSource {
    fn with_requests(requests: Vec<Request>) -> Arc<Self> {
        let source = MockSource::default();
        source.queue.lock().extend(requests);
        Arc::new(source)
    }

    fn push(&self, request: Request) {
        self.queue.lock().push_back(request);
    }

    fn in_flight(&self) -> usize {
        self.acquired.load(Ordering::SeqCst) - self.released.load(Ordering::SeqCst)
    }

    fn outcomes(&self) -> Vec<(String, bool)> {
        self.outcomes.lock().clone()
    }
}

#[async_trait]
impl RequestSource for MockSource {
    async fn pull(&self) -> Option<Request> {
        if self.stopping.load(Ordering::SeqCst) {
            return None;
        }
        self.queue.lock().pop_front()
    }

    async fn acquire_slot(&self) {
        self.acquired.fetch_add(1, Ordering::SeqCst);
    }

    fn release_slot(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    async fn record_outcome(&self, request: &Request, success: bool) -> bool {
        self.outcomes
            .lock()
            .push((request.url.path().to_string(), success));
        true
    }

    async fn enqueue(&self, request: Request) -> Result<(), CrawlerError> {
        self.push(request);
        Ok(())
    }

    async fn can_stop(&self) -> bool {
        if self.stopping.load(Ordering::SeqCst) {
            return true;
        }
        self.started.load(Ordering::SeqCst)
            && !self.producing.load(Ordering::SeqCst)
            && self.queue.lock().is_empty()
            && self.in_flight() == 0
    }

    async fn start(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.started.store(true, Ordering::SeqCst);
    }

    fn trigger_stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    async fn await_drain(&self) {
        while self.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

/// Serves every URL with a fixed body, except paths listed as failing.
#[derive(Default)]
struct ScriptedDownloader {
    failing: HashSet<String>,
    delay: Duration,
    calls: AtomicUsize,
    current: AtomicUsize,
    max_concurrent: AtomicUsize,
}

impl ScriptedDownloader {
    fn failing(paths: &[&str]) -> Self {
        ScriptedDownloader {
            failing: paths.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    fn delayed(delay: Duration) -> Self {
        ScriptedDownloader {
            delay,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Downloader for ScriptedDownloader {
    async fn download(&self, _config: &CrawlerConfig, ctx: &mut Context) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.current.fetch_sub(1, Ordering::SeqCst);

        let target = ctx.request().url.clone();
        if self.failing.contains(target.path()) {
            ctx.set_error(FetchError::Status(503));
        } else {
            ctx.set_response(Response::new(target, 200, "<html>ok</html>"));
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Start,
    Data(String),
    File(String),
    Stop,
}

#[derive(Clone, Default)]
struct RecordingPipeline {
    events: Arc<Mutex<Vec<Event>>>,
    fail_start: bool,
}

impl RecordingPipeline {
    fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    fn data_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Data(_)))
            .count()
    }

    fn stop_count(&self) -> usize {
        self.events().iter().filter(|e| **e == Event::Stop).count()
    }
}

#[async_trait]
impl Pipeline for RecordingPipeline {
    fn name(&self) -> &str {
        "recording"
    }

    async fn start(&self) -> Result<(), CrawlerError> {
        if self.fail_start {
            return Err(CrawlerError::PipelineError("sink unavailable".into()));
        }
        self.events.lock().push(Event::Start);
        Ok(())
    }

    async fn stop(&self) -> Result<(), CrawlerError> {
        self.events.lock().push(Event::Stop);
        Ok(())
    }

    async fn collect_data(&self, item: Item) {
        self.events
            .lock()
            .push(Event::Data(item.url.path().to_string()));
    }

    async fn collect_file(&self, file: FileRecord) {
        self.events.lock().push(Event::File(file.name));
    }
}

fn item_rules() -> RuleTree {
    RuleTree::new("test").rule_fn("page", |ctx| {
        ctx.check_running()?;
        let mut fields = Map::new();
        fields.insert("path".into(), json!(ctx.request().url.path()));
        ctx.add_item(fields);
        Ok(())
    })
}

struct Harness {
    crawler: Crawler,
    pipeline: RecordingPipeline,
    stats: Arc<StatCollector>,
}

fn harness(
    source: Arc<dyn RequestSource>,
    downloader: Arc<dyn Downloader>,
    rules: RuleTree,
) -> Harness {
    let pipeline = RecordingPipeline::default();
    let stats = Arc::new(StatCollector::new());
    let crawler = CrawlerBuilder::new(1)
        .pause_time_ms(20)
        .source(source)
        .downloader(downloader)
        .pipeline(pipeline.clone())
        .stats(Arc::clone(&stats) as Arc<dyn Stats>)
        .rules(rules)
        .build()
        .unwrap();
    Harness {
        crawler,
        pipeline,
        stats,
    }
}

#[tokio::test(start_paused = true)]
async fn test_every_request_succeeds() {
    let source = MockSource::with_requests(vec![
        request("/1", "page"),
        request("/2", "page"),
        request("/3", "page"),
    ]);
    let h = harness(
        source.clone(),
        Arc::new(ScriptedDownloader::default()),
        item_rules(),
    );

    h.crawler.run().await.unwrap();

    assert_eq!(h.stats.succeeded(), 3);
    assert_eq!(h.stats.failed(), 0);
    assert_eq!(h.stats.requests_dispatched.load(Ordering::SeqCst), 3);
    assert_eq!(h.stats.items_collected.load(Ordering::SeqCst), 3);

    let events = h.pipeline.events();
    assert_eq!(events.first(), Some(&Event::Start));
    assert_eq!(events.last(), Some(&Event::Stop));
    assert_eq!(h.pipeline.data_count(), 3);
    assert_eq!(h.pipeline.stop_count(), 1);

    assert_eq!(source.acquired.load(Ordering::SeqCst), 3);
    assert_eq!(source.in_flight(), 0);
    assert_eq!(source.starts.load(Ordering::SeqCst), 1);
    assert!(source.outcomes().iter().all(|(_, success)| *success));
    assert_eq!(h.crawler.state(), CrawlerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_download_error_skips_parse() {
    let parsed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&parsed);
    let rules = RuleTree::new("test").rule_fn("page", move |ctx| {
        counter.fetch_add(1, Ordering::SeqCst);
        ctx.add_item(Map::new());
        Ok(())
    });
    let source = MockSource::with_requests(vec![request("/down", "page")]);
    let h = harness(
        source.clone(),
        Arc::new(ScriptedDownloader::failing(&["/down"])),
        rules,
    );

    h.crawler.run().await.unwrap();

    assert_eq!(parsed.load(Ordering::SeqCst), 0);
    assert_eq!(h.stats.failed(), 1);
    assert_eq!(h.stats.succeeded(), 0);
    assert_eq!(h.pipeline.data_count(), 0);
    assert_eq!(source.outcomes(), vec![("/down".to_string(), false)]);
    assert_eq!(source.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_parse_changes_no_counters() {
    let rules = item_rules().rule_fn("cancel", |_| Err(ParseError::Cancelled));
    let source = MockSource::with_requests(vec![
        request("/a", "page"),
        request("/c", "cancel"),
        request("/b", "page"),
    ]);
    let h = harness(
        source.clone(),
        Arc::new(ScriptedDownloader::default()),
        rules,
    );

    h.crawler.run().await.unwrap();

    assert_eq!(h.stats.succeeded(), 2);
    assert_eq!(h.stats.failed(), 0);
    assert_eq!(h.pipeline.data_count(), 2);
    let outcomes: Vec<String> = source.outcomes().into_iter().map(|(p, _)| p).collect();
    assert!(!outcomes.contains(&"/c".to_string()));
    assert_eq!(source.acquired.load(Ordering::SeqCst), 3);
    assert_eq!(source.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_in_flight_drains() {
    let source = MockSource::with_requests(vec![
        request("/1", "page"),
        request("/2", "page"),
        request("/3", "page"),
        request("/4", "page"),
    ]);
    let h = harness(
        source.clone(),
        Arc::new(ScriptedDownloader::delayed(Duration::from_millis(500))),
        item_rules(),
    );

    let runner = h.crawler.clone();
    let handle = tokio::spawn(async move { runner.run().await });
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(h.crawler.state(), CrawlerState::Running);
    assert!(source.in_flight() > 0);

    h.crawler.stop();
    assert!(h.crawler.is_stopping());
    handle.await.unwrap().unwrap();

    assert_eq!(h.crawler.state(), CrawlerState::Stopped);
    assert_eq!(source.in_flight(), 0);
    assert_eq!(h.stats.succeeded(), 0);
    assert_eq!(h.stats.failed(), 0);
    assert_eq!(h.pipeline.data_count(), 0);
    assert_eq!(h.pipeline.stop_count(), 1);
    assert_eq!(h.pipeline.events().last(), Some(&Event::Stop));
    // Requests never admitted stay queued.
    assert!(!source.queue.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_empty_pulls_do_not_end_the_crawl() {
    let source = MockSource::with_requests(Vec::new());
    source.producing.store(true, Ordering::SeqCst);
    let h = harness(
        source.clone(),
        Arc::new(ScriptedDownloader::default()),
        item_rules(),
    );

    let producer = Arc::clone(&source);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        producer.push(request("/late", "page"));
        producer.producing.store(false, Ordering::SeqCst);
    });

    h.crawler.run().await.unwrap();

    assert_eq!(h.stats.succeeded(), 1);
    assert_eq!(h.pipeline.events(), vec![
        Event::Start,
        Event::Data("/late".to_string()),
        Event::Stop,
    ]);
}

#[tokio::test(start_paused = true)]
async fn test_faults_and_panics_release_every_slot() {
    let rules = item_rules()
        .rule_fn("fault", |_| Err(ParseError::fault("selector not found")))
        .rule_fn("boom", |_| panic!("rule exploded"));
    let source = MockSource::with_requests(vec![
        request("/fault", "fault"),
        request("/boom", "boom"),
        request("/down", "page"),
        request("/missing", "no-such-rule"),
        request("/ok", "page"),
    ]);
    let h = harness(
        source.clone(),
        Arc::new(ScriptedDownloader::failing(&["/down"])),
        rules,
    );

    h.crawler.run().await.unwrap();

    assert_eq!(source.acquired.load(Ordering::SeqCst), 5);
    assert_eq!(source.in_flight(), 0);
    assert_eq!(h.stats.failed(), 4);
    assert_eq!(h.stats.succeeded(), 1);
    assert_eq!(h.pipeline.events(), vec![
        Event::Start,
        Event::Data("/ok".to_string()),
        Event::Stop,
    ]);
}

#[tokio::test(start_paused = true)]
async fn test_files_follow_items_and_follow_ups_are_enqueued() {
    let rules = RuleTree::new("test")
        .rule_fn("index", |ctx| {
            ctx.add_item(Map::new());
            ctx.add_file("index.html", ctx.text().into_owned());
            ctx.follow(url("/child"), "page");
            Ok(())
        })
        .rule_fn("page", |ctx| {
            assert_eq!(ctx.request().depth, 1);
            assert_eq!(ctx.request().referer, Some(url("/")));
            ctx.add_item(Map::new());
            Ok(())
        });
    let source = MockSource::with_requests(vec![request("/", "index")]);
    let h = harness(
        source.clone(),
        Arc::new(ScriptedDownloader::default()),
        rules,
    );

    h.crawler.run().await.unwrap();

    assert_eq!(h.pipeline.events(), vec![
        Event::Start,
        Event::Data("/".to_string()),
        Event::File("index.html".to_string()),
        Event::Data("/child".to_string()),
        Event::Stop,
    ]);
    assert_eq!(h.stats.files_collected.load(Ordering::SeqCst), 1);
    assert_eq!(h.stats.rule_successes.get("index").map(|v| *v), Some(1));
    assert_eq!(h.stats.rule_successes.get("page").map(|v| *v), Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_run_twice_is_rejected() {
    let source = MockSource::with_requests(vec![request("/1", "page")]);
    let h = harness(source, Arc::new(ScriptedDownloader::default()), item_rules());

    h.crawler.run().await.unwrap();
    let err = h.crawler.run().await.unwrap_err();
    assert!(matches!(
        err,
        CrawlerError::InvalidState {
            expected: CrawlerState::Idle,
            actual: CrawlerState::Stopped,
        }
    ));
    assert_eq!(h.pipeline.stop_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pipeline_start_failure_aborts_run() {
    let source = MockSource::with_requests(vec![request("/1", "page")]);
    let downloader = Arc::new(ScriptedDownloader::default());
    let pipeline = RecordingPipeline {
        fail_start: true,
        ..Default::default()
    };
    let crawler = CrawlerBuilder::new(1)
        .pause_time_ms(20)
        .source(source.clone())
        .downloader(downloader.clone())
        .pipeline(pipeline.clone())
        .rules(item_rules())
        .build()
        .unwrap();

    let err = crawler.run().await.unwrap_err();
    assert!(matches!(err, CrawlerError::PipelineError(_)));
    assert_eq!(crawler.state(), CrawlerState::Stopped);
    assert_eq!(downloader.calls.load(Ordering::SeqCst), 0);
    assert_eq!(source.starts.load(Ordering::SeqCst), 0);
    assert!(pipeline.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_end_to_end_with_retries_and_dedup() {
    let rules = RuleTree::new("site")
        .rule_fn("index", |ctx| {
            for path in ["/a", "/b", "/flaky", "/a"] {
                ctx.follow(url(path), "detail");
            }
            Ok(())
        })
        .rule_fn("detail", |ctx| {
            let mut fields = Map::new();
            fields.insert("depth".into(), json!(ctx.request().depth));
            ctx.add_item(fields);
            Ok(())
        });
    let scheduler = Arc::new(
        Scheduler::new(SchedulerConfig {
            max_concurrency: 2,
            max_retries: 1,
            dedup_capacity: 1000,
        })
        .with_seeds(vec![request("/", "index")]),
    );
    let downloader = Arc::new(ScriptedDownloader {
        delay: Duration::from_millis(100),
        ..ScriptedDownloader::failing(&["/flaky"])
    });
    let h = harness(scheduler.clone(), downloader.clone(), rules);

    h.crawler.run().await.unwrap();

    // index, /a, /b and two attempts at /flaky.
    assert_eq!(h.stats.requests_dispatched.load(Ordering::SeqCst), 5);
    assert_eq!(downloader.calls.load(Ordering::SeqCst), 5);
    assert_eq!(h.stats.succeeded(), 3);
    assert_eq!(h.stats.failed(), 1);
    assert_eq!(h.pipeline.data_count(), 2);
    assert!(downloader.max_concurrent.load(Ordering::SeqCst) <= 2);
    assert_eq!(scheduler.in_flight(), 0);
    assert!(scheduler.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_caps_concurrency() {
    let seeds = (0..8).map(|i| request(&format!("/{}", i), "page")).collect();
    let scheduler = Arc::new(
        Scheduler::new(SchedulerConfig {
            max_concurrency: 3,
            ..Default::default()
        })
        .with_seeds(seeds),
    );
    let downloader = Arc::new(ScriptedDownloader::delayed(Duration::from_secs(1)));
    let h = harness(scheduler.clone(), downloader.clone(), item_rules());

    h.crawler.run().await.unwrap();

    assert_eq!(h.stats.succeeded(), 8);
    assert_eq!(downloader.max_concurrent.load(Ordering::SeqCst), 3);
    assert_eq!(scheduler.in_flight(), 0);
}
