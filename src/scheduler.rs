//! Task scheduler: runs every language of a translation batch.
//!
//! Each language's units are split into chunks and sent through a
//! [`CompletionBackend`], either one chunk at a time or through a bounded
//! worker pool spanning all languages. Results are applied to the language's
//! document and the document is persisted once, including after failures
//! and cancellation.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ConcurrencyMode, RunOptions};
use crate::decode::{parse_plural_translations, parse_translations};
use crate::document::{TranslatableUnit, TranslationDocument};
use crate::error::{LanguageFailure, RunError, TranslateError};
use crate::executor::CompletionBackend;
use crate::i18n::{Language, TranslationValidator};
use crate::plural::{build_user_prompt, has_plurals, plural_count, PluralTranslation};
use crate::rate_limit::RateLimitCoordinator;
use crate::retry::sleep_or_cancel;

/// One target language: the document to fill in and where to write it.
pub struct LanguageTask<D> {
    pub language: Language,
    pub document: D,
    pub output_path: PathBuf,
}

impl<D> LanguageTask<D> {
    pub fn new(language: Language, document: D, output_path: impl Into<PathBuf>) -> Self {
        Self {
            language,
            document,
            output_path: output_path.into(),
        }
    }
}

/// Outcome of a run in which no language failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Languages in the run
    pub languages: usize,
    /// Units that received a non-empty translation
    pub units_translated: usize,
    /// Whether the run stopped early on cancellation
    pub cancelled: bool,
}

/// Split `items` into chunks of `chunk_size`, preserving order.
///
/// A chunk size of 0 yields a single chunk holding everything. No chunk is
/// ever empty.
pub fn split_into_chunks<T: Clone>(items: &[T], chunk_size: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    if chunk_size == 0 {
        return vec![items.to_vec()];
    }
    items.chunks(chunk_size).map(<[T]>::to_vec).collect()
}

/// Per-language values computed once before any request is sent.
struct LanguagePlan {
    code: String,
    name: String,
    system_prompt: String,
    nplurals: usize,
    total: usize,
}

impl LanguagePlan {
    fn failure(&self, reason: String) -> LanguageFailure {
        LanguageFailure {
            code: self.code.clone(),
            name: self.name.clone(),
            reason,
        }
    }
}

/// Work out what a language needs and split it into chunks.
fn plan_language<D: TranslationDocument>(
    task: &LanguageTask<D>,
    options: &RunOptions,
) -> (LanguagePlan, Vec<Vec<TranslatableUnit>>) {
    let units: Vec<TranslatableUnit> = task
        .document
        .units_needing_translation(options.retranslate_existing, options.include_fuzzy)
        .iter()
        .filter_map(|id| task.document.unit(id))
        .collect();

    let header = task.document.plural_forms_header();
    let plan = LanguagePlan {
        code: task.language.code().to_string(),
        name: task.language.name().to_string(),
        system_prompt: options.system_prompt(task.language.name()),
        nplurals: plural_count(header.as_deref(), &task.language),
        total: units.len(),
    };
    let chunks = split_into_chunks(&units, options.chunk_size);
    (plan, chunks)
}

/// Translate every task, persisting each touched document.
///
/// Returns `Ok` when no language failed (a cancelled run is not a failure),
/// or [`RunError::LanguagesFailed`] naming every language that did.
pub async fn translate_documents<D>(
    tasks: Vec<LanguageTask<D>>,
    backend: Arc<dyn CompletionBackend>,
    options: &RunOptions,
    cancel: CancellationToken,
) -> Result<RunSummary, RunError>
where
    D: TranslationDocument + 'static,
{
    let mut seen = HashSet::new();
    for task in &tasks {
        if !seen.insert(task.output_path.clone()) {
            return Err(RunError::DuplicateOutput(task.output_path.clone()));
        }
    }

    let languages = tasks.len();
    let rate_limit = Arc::new(RateLimitCoordinator::new());

    info!(
        "Translating {} language(s) in {:?} mode",
        languages, options.concurrency
    );

    let (failures, units_translated, cancelled) = match options.concurrency {
        ConcurrencyMode::Sequential => {
            run_sequential(tasks, backend.as_ref(), options, &rate_limit, &cancel).await
        }
        ConcurrencyMode::FullParallel => {
            run_parallel(tasks, backend, options, rate_limit, cancel).await
        }
    };

    if cancelled {
        warn!("Run cancelled; partial results were saved");
    }

    if failures.is_empty() {
        info!(
            "✓ Run finished: {} unit(s) translated across {} language(s)",
            units_translated, languages
        );
        Ok(RunSummary {
            languages,
            units_translated,
            cancelled,
        })
    } else {
        error!("{} language(s) failed", failures.len());
        Err(RunError::LanguagesFailed(failures))
    }
}

async fn run_sequential<D: TranslationDocument>(
    tasks: Vec<LanguageTask<D>>,
    backend: &dyn CompletionBackend,
    options: &RunOptions,
    rate_limit: &RateLimitCoordinator,
    cancel: &CancellationToken,
) -> (Vec<LanguageFailure>, usize, bool) {
    let mut failures = Vec::new();
    let mut units_translated = 0;
    let mut cancelled = false;

    for mut task in tasks {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        let (plan, chunks) = plan_language(&task, options);
        if chunks.is_empty() {
            log_message(options, &format!("{}: nothing to translate", task.language));
            continue;
        }
        log_message(
            options,
            &format!(
                "{}: translating {} unit(s) in {} chunk(s)",
                task.language,
                plan.total,
                chunks.len()
            ),
        );

        let mut done = 0;
        let mut dirty = false;
        let mut failure = None;

        for (index, chunk) in chunks.iter().enumerate() {
            if index > 0 && sleep_or_cancel(options.launch_delay, cancel).await.is_err() {
                cancelled = true;
                break;
            }
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            match translate_chunk(backend, &plan, chunk, rate_limit, cancel).await {
                Ok(results) => {
                    units_translated += apply_results(
                        &mut task.document,
                        chunk,
                        results,
                        plan.nplurals,
                        options.include_fuzzy,
                    );
                    dirty = true;
                    done += chunk.len();
                    debug!("{}: chunk {}/{} applied", plan.code, index + 1, chunks.len());
                    options.report_progress(&plan.code, done, plan.total);
                }
                Err(e) if e.is_cancelled() => {
                    cancelled = true;
                    break;
                }
                Err(e) => {
                    failure = Some(e.to_string());
                    break;
                }
            }
        }

        if dirty {
            if let Err(e) = task.document.persist(&task.output_path) {
                failure.get_or_insert(format!("failed to save {}: {:#}", task.output_path.display(), e));
            } else {
                info!("✓ Saved {}", task.output_path.display());
            }
        }

        if let Some(reason) = failure {
            failures.push(report_failure(options, plan.failure(reason)));
        }
        if cancelled {
            break;
        }
    }

    (failures, units_translated, cancelled)
}

/// A language's document plus what has happened to it during a parallel run.
struct Slot<D> {
    document: D,
    dirty: bool,
    done: usize,
    failure: Option<String>,
}

struct Job {
    language: usize,
    units: Vec<TranslatableUnit>,
}

async fn run_parallel<D>(
    tasks: Vec<LanguageTask<D>>,
    backend: Arc<dyn CompletionBackend>,
    options: &RunOptions,
    rate_limit: Arc<RateLimitCoordinator>,
    cancel: CancellationToken,
) -> (Vec<LanguageFailure>, usize, bool)
where
    D: TranslationDocument + 'static,
{
    let mut plans = Vec::with_capacity(tasks.len());
    let mut slots = Vec::with_capacity(tasks.len());
    let mut outputs = Vec::with_capacity(tasks.len());
    let mut jobs = Vec::new();

    for (index, task) in tasks.into_iter().enumerate() {
        let (plan, chunks) = plan_language(&task, options);
        if chunks.is_empty() {
            log_message(options, &format!("{}: nothing to translate", task.language));
        }
        jobs.extend(chunks.into_iter().map(|units| Job {
            language: index,
            units,
        }));
        plans.push(Arc::new(plan));
        outputs.push(task.output_path);
        slots.push(Arc::new(Mutex::new(Slot {
            document: task.document,
            dirty: false,
            done: 0,
            failure: None,
        })));
    }

    log_message(
        options,
        &format!(
            "Launching {} chunk(s) across {} worker(s)",
            jobs.len(),
            options.worker_count()
        ),
    );

    let semaphore = Arc::new(Semaphore::new(options.worker_count()));
    let translated = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let mut handles = Vec::with_capacity(jobs.len());
    let mut cancelled = false;

    for (launched, job) in jobs.into_iter().enumerate() {
        if launched > 0 && sleep_or_cancel(options.launch_delay, &cancel).await.is_err() {
            cancelled = true;
            break;
        }

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                cancelled = true;
                break;
            }
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let slot = Arc::clone(&slots[job.language]);
        if slot.lock().await.failure.is_some() {
            debug!("Skipping chunk for failed language {}", plans[job.language].code);
            continue;
        }

        let plan = Arc::clone(&plans[job.language]);
        let backend = Arc::clone(&backend);
        let rate_limit = Arc::clone(&rate_limit);
        let cancel = cancel.clone();
        let options = options.clone();
        let translated = Arc::clone(&translated);

        let language = job.language;
        let handle = tokio::spawn(async move {
            let _permit = permit;
            let outcome =
                translate_chunk(backend.as_ref(), &plan, &job.units, &rate_limit, &cancel).await;

            let mut guard = slot.lock().await;
            let slot = &mut *guard;
            match outcome {
                Ok(results) => {
                    let applied = apply_results(
                        &mut slot.document,
                        &job.units,
                        results,
                        plan.nplurals,
                        options.include_fuzzy,
                    );
                    translated.fetch_add(applied, std::sync::atomic::Ordering::Relaxed);
                    slot.dirty = true;
                    slot.done += job.units.len();
                    options.report_progress(&plan.code, slot.done, plan.total);
                }
                Err(e) if e.is_cancelled() => {
                    debug!("{}: chunk abandoned on cancellation", plan.code);
                }
                Err(e) => {
                    error!("{}: chunk failed: {}", plan.code, e);
                    slot.failure.get_or_insert(e.to_string());
                }
            }
        });
        handles.push((language, handle));
    }

    let (languages, handles): (Vec<usize>, Vec<_>) = handles.into_iter().unzip();
    for (language, result) in languages.into_iter().zip(join_all(handles).await) {
        if let Err(e) = result {
            error!("{}: translation worker panicked: {}", plans[language].code, e);
            slots[language]
                .lock()
                .await
                .failure
                .get_or_insert(format!("worker panicked: {}", e));
        }
    }
    if cancel.is_cancelled() {
        cancelled = true;
    }

    let mut failures = Vec::new();
    for ((plan, slot), output) in plans.iter().zip(&slots).zip(&outputs) {
        let mut slot = slot.lock().await;
        if slot.dirty {
            match slot.document.persist(output) {
                Ok(()) => info!("✓ Saved {}", output.display()),
                Err(e) => {
                    slot.failure
                        .get_or_insert(format!("failed to save {}: {:#}", output.display(), e));
                }
            }
        }
        if let Some(reason) = slot.failure.take() {
            failures.push(report_failure(options, plan.failure(reason)));
        }
    }

    (
        failures,
        translated.load(std::sync::atomic::Ordering::Relaxed),
        cancelled,
    )
}

/// Send one chunk and decode the answer. Never touches the document.
async fn translate_chunk(
    backend: &dyn CompletionBackend,
    plan: &LanguagePlan,
    units: &[TranslatableUnit],
    rate_limit: &RateLimitCoordinator,
    cancel: &CancellationToken,
) -> Result<Vec<PluralTranslation>, TranslateError> {
    let user_prompt = build_user_prompt(units, plan.nplurals);
    let text = backend
        .complete(&plan.system_prompt, &user_prompt, rate_limit, cancel)
        .await?;

    if has_plurals(units) {
        Ok(parse_plural_translations(&text, units.len())?)
    } else {
        Ok(parse_translations(&text, units.len())?
            .into_iter()
            .map(PluralTranslation::Single)
            .collect())
    }
}

/// Write decoded results into the document by position.
///
/// Extra results are ignored and units without a result are left alone.
/// Empty strings never overwrite. Returns the number of units that received
/// a translation.
fn apply_results<D: TranslationDocument + ?Sized>(
    document: &mut D,
    units: &[TranslatableUnit],
    results: Vec<PluralTranslation>,
    nplurals: usize,
    include_fuzzy: bool,
) -> usize {
    if results.len() != units.len() {
        warn!(
            "Expected {} translation(s), got {}; applying by position",
            units.len(),
            results.len()
        );
    }

    let mut applied = 0;
    for (unit, result) in units.iter().zip(results) {
        let wrote = match &unit.plural_source {
            Some(plural_source) => {
                let mut wrote = false;
                for (index, form) in result.into_forms(nplurals).iter().enumerate() {
                    if form.is_empty() {
                        continue;
                    }
                    let source = if index == 0 { &unit.source } else { plural_source };
                    check_placeholders(&unit.id, source, form);
                    document.set_form(&unit.id, index, form);
                    wrote = true;
                }
                wrote
            }
            None => {
                let text = result.into_text();
                if text.is_empty() {
                    false
                } else {
                    check_placeholders(&unit.id, &unit.source, &text);
                    document.set(&unit.id, &text);
                    true
                }
            }
        };

        if wrote {
            applied += 1;
            if include_fuzzy && unit.needs_review {
                document.clear_needs_review(&unit.id);
            }
        }
    }
    applied
}

fn check_placeholders(id: &str, source: &str, translated: &str) {
    let report = TranslationValidator::validate(source, translated);
    for issue in report.errors.iter().chain(&report.warnings) {
        warn!("'{}': {}", id, issue);
    }
}

fn log_message(options: &RunOptions, message: &str) {
    info!("{}", message);
    options.report_log(message);
}

fn report_failure(options: &RunOptions, failure: LanguageFailure) -> LanguageFailure {
    error!("✗ {}", failure);
    options.report_error(&failure.to_string());
    failure
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MemoryCatalog;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    // ==================== Helper Functions ====================

    /// Answers every prompt by echoing each numbered source line with a prefix.
    struct EchoBackend {
        prefix: String,
        calls: AtomicUsize,
        fail_on_call: Option<usize>,
        cancel_on_call: Option<(usize, CancellationToken)>,
    }

    impl EchoBackend {
        fn new(prefix: &str) -> Self {
            Self {
                prefix: prefix.to_string(),
                calls: AtomicUsize::new(0),
                fail_on_call: None,
                cancel_on_call: None,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionBackend for EchoBackend {
        async fn complete(
            &self,
            system_prompt: &str,
            user_prompt: &str,
            _rate_limit: &RateLimitCoordinator,
            _cancel: &CancellationToken,
        ) -> Result<String, TranslateError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((on_call, token)) = &self.cancel_on_call {
                if *on_call == call {
                    token.cancel();
                }
            }
            if self.fail_on_call == Some(call) {
                return Err(TranslateError::ClientRejected {
                    status: 400,
                    body: "nope".to_string(),
                });
            }
            let language = if system_prompt.contains("German") { "de" } else { "xx" };
            let items: Vec<String> = user_prompt
                .lines()
                .filter(|l| l.chars().next().is_some_and(|c| c.is_ascii_digit()))
                .map(|l| {
                    let source = l.split_once(". ").map(|(_, s)| s).unwrap_or(l);
                    format!("{}-{}:{}", self.prefix, language, source.trim_matches('"'))
                })
                .collect();
            Ok(serde_json::to_string(&items).unwrap())
        }
    }

    fn catalog(count: usize) -> MemoryCatalog {
        MemoryCatalog::from_units(
            (1..=count).map(|i| TranslatableUnit::new(format!("u{}", i), format!("Text {}", i))),
        )
    }

    // ==================== Chunking Tests ====================

    #[test]
    fn test_split_into_chunks_basic() {
        let chunks = split_into_chunks(&[1, 2, 3, 4, 5], 2);
        assert_eq!(chunks, vec![vec![1, 2], vec![3, 4], vec![5]]);
    }

    #[test]
    fn test_split_into_chunks_zero_is_unchunked() {
        assert_eq!(split_into_chunks(&[1, 2, 3], 0), vec![vec![1, 2, 3]]);
    }

    #[test]
    fn test_split_into_chunks_empty() {
        assert!(split_into_chunks::<u8>(&[], 3).is_empty());
        assert!(split_into_chunks::<u8>(&[], 0).is_empty());
    }

    proptest! {
        #[test]
        fn prop_chunks_preserve_order_and_count(items in proptest::collection::vec(any::<u16>(), 0..200), size in 1usize..50) {
            let chunks = split_into_chunks(&items, size);
            prop_assert_eq!(chunks.len(), items.len().div_ceil(size));
            prop_assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= size));
            let flattened: Vec<u16> = chunks.into_iter().flatten().collect();
            prop_assert_eq!(flattened, items);
        }
    }

    // ==================== Apply Tests ====================

    #[test]
    fn test_apply_results_by_position_and_bounds() {
        let mut doc = catalog(3);
        let units: Vec<_> = ["u1", "u2", "u3"].iter().map(|id| doc.unit(id).unwrap()).collect();

        let applied = apply_results(
            &mut doc,
            &units,
            vec![
                PluralTranslation::Single("A".into()),
                PluralTranslation::Single("".into()),
            ],
            2,
            false,
        );

        assert_eq!(applied, 1);
        assert_eq!(doc.get("u1").as_deref(), Some("A"));
        assert_eq!(doc.get("u2"), None);
        assert_eq!(doc.get("u3"), None);
    }

    #[test]
    fn test_apply_plural_pads_and_skips_empty_forms() {
        let mut doc = MemoryCatalog::new();
        doc.push_translated(
            TranslatableUnit::new("files", "%d file").with_plural("%d files"),
            vec!["old0".into(), "old1".into(), "old2".into()],
        );
        let units = vec![doc.unit("files").unwrap()];

        apply_results(
            &mut doc,
            &units,
            vec![PluralTranslation::Forms(vec!["%d plik".into(), "".into()])],
            3,
            false,
        );

        assert_eq!(
            doc.translations("files").unwrap(),
            &["%d plik".to_string(), "old1".to_string(), "old2".to_string()]
        );
    }

    #[test]
    fn test_apply_clears_review_only_with_include_fuzzy() {
        let mut doc = MemoryCatalog::new();
        doc.push_translated(TranslatableUnit::new("a", "A").needing_review(), vec!["x".into()]);
        let units = vec![doc.unit("a").unwrap()];

        apply_results(&mut doc, &units, vec![PluralTranslation::Single("y".into())], 2, false);
        assert!(doc.unit("a").unwrap().needs_review);

        apply_results(&mut doc, &units, vec![PluralTranslation::Single("".into())], 2, true);
        assert!(doc.unit("a").unwrap().needs_review);

        apply_results(&mut doc, &units, vec![PluralTranslation::Single("z".into())], 2, true);
        assert!(!doc.unit("a").unwrap().needs_review);
    }

    // ==================== Run Tests ====================

    #[tokio::test]
    async fn test_sequential_run_translates_and_persists() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("de.json");
        let backend = Arc::new(EchoBackend::new("t"));
        let progress = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorded = Arc::clone(&progress);
        let options = RunOptions::default()
            .with_chunk_size(2)
            .with_progress(move |lang, done, total| {
                recorded.lock().unwrap().push((lang.to_string(), done, total));
            });

        let tasks = vec![LanguageTask::new(Language::from_code("de"), catalog(3), &output)];
        let summary = translate_documents(tasks, backend.clone(), &options, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.units_translated, 3);
        assert!(!summary.cancelled);
        assert_eq!(backend.calls(), 2);
        assert_eq!(
            *progress.lock().unwrap(),
            vec![("de".to_string(), 2, 3), ("de".to_string(), 3, 3)]
        );

        let saved = MemoryCatalog::load(&output).unwrap();
        assert_eq!(saved.get("u3").as_deref(), Some("t-de:Text 3"));
    }

    #[tokio::test]
    async fn test_duplicate_outputs_rejected_before_any_call() {
        let backend = Arc::new(EchoBackend::new("t"));
        let tasks = vec![
            LanguageTask::new(Language::from_code("de"), catalog(1), "out.json"),
            LanguageTask::new(Language::from_code("fr"), catalog(1), "out.json"),
        ];

        let err = translate_documents(tasks, backend.clone(), &RunOptions::default(), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::DuplicateOutput(_)));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_sequential_failure_continues_with_next_language() {
        let dir = TempDir::new().unwrap();
        let mut backend = EchoBackend::new("t");
        backend.fail_on_call = Some(2);
        let backend = Arc::new(backend);
        let errors = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorded = Arc::clone(&errors);
        let options = RunOptions::default()
            .with_chunk_size(1)
            .with_error(move |message| recorded.lock().unwrap().push(message.to_string()));

        let tasks = vec![
            LanguageTask::new(Language::from_code("de"), catalog(2), dir.path().join("de.json")),
            LanguageTask::new(Language::from_code("fr"), catalog(2), dir.path().join("fr.json")),
        ];
        let err = translate_documents(tasks, backend.clone(), &options, CancellationToken::new())
            .await
            .unwrap_err();

        let failures = err.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].code, "de");
        assert!(failures[0].reason.contains("400"));
        assert_eq!(errors.lock().unwrap().len(), 1);
        assert_eq!(backend.calls(), 4);

        // German keeps its first chunk
        let german = MemoryCatalog::load(&dir.path().join("de.json")).unwrap();
        assert!(german.get("u1").is_some());
        assert!(german.get("u2").is_none());
        let french = MemoryCatalog::load(&dir.path().join("fr.json")).unwrap();
        assert_eq!(french.stats().translated, 2);
    }

    #[tokio::test]
    async fn test_parallel_run_respects_worker_limit() {
        struct Gauge {
            active: AtomicUsize,
            peak: AtomicUsize,
        }

        #[async_trait]
        impl CompletionBackend for Gauge {
            async fn complete(
                &self,
                _system_prompt: &str,
                _user_prompt: &str,
                _rate_limit: &RateLimitCoordinator,
                _cancel: &CancellationToken,
            ) -> Result<String, TranslateError> {
                let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                self.active.fetch_sub(1, Ordering::SeqCst);
                Ok(r#"["x"]"#.to_string())
            }
        }

        let dir = TempDir::new().unwrap();
        let gauge = Arc::new(Gauge {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let options = RunOptions::default()
            .with_chunk_size(1)
            .with_concurrency(ConcurrencyMode::FullParallel, 2);

        let tasks = vec![
            LanguageTask::new(Language::from_code("de"), catalog(3), dir.path().join("de.json")),
            LanguageTask::new(Language::from_code("fr"), catalog(3), dir.path().join("fr.json")),
        ];
        let summary = translate_documents(tasks, gauge.clone(), &options, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.units_translated, 6);
        assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(
            MemoryCatalog::load(&dir.path().join("fr.json")).unwrap().stats().translated,
            3
        );
    }

    #[tokio::test]
    async fn test_parallel_cancel_mid_run_persists_launched_chunks() {
        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let mut backend = EchoBackend::new("t");
        backend.cancel_on_call = Some((1, cancel.clone()));
        let backend = Arc::new(backend);
        let options = RunOptions::default()
            .with_chunk_size(2)
            .with_concurrency(ConcurrencyMode::FullParallel, 1);

        let output = dir.path().join("de.json");
        let tasks = vec![LanguageTask::new(Language::from_code("de"), catalog(5), &output)];
        let summary = translate_documents(tasks, backend.clone(), &options, cancel)
            .await
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.units_translated, 2);
        assert_eq!(backend.calls(), 1);

        let saved = MemoryCatalog::load(&output).unwrap();
        assert_eq!(saved.get("u1").as_deref(), Some("t-de:Text 1"));
        assert_eq!(saved.get("u2").as_deref(), Some("t-de:Text 2"));
        assert!(saved.get("u3").is_none());
    }

    #[tokio::test]
    async fn test_parallel_worker_panic_fails_language() {
        struct Exploding;

        #[async_trait]
        impl CompletionBackend for Exploding {
            async fn complete(
                &self,
                _system_prompt: &str,
                _user_prompt: &str,
                _rate_limit: &RateLimitCoordinator,
                _cancel: &CancellationToken,
            ) -> Result<String, TranslateError> {
                panic!("backend exploded");
            }
        }

        let dir = TempDir::new().unwrap();
        let options = RunOptions::default().with_concurrency(ConcurrencyMode::FullParallel, 2);
        let tasks = vec![LanguageTask::new(
            Language::from_code("de"),
            catalog(2),
            dir.path().join("de.json"),
        )];

        let err = translate_documents(tasks, Arc::new(Exploding), &options, CancellationToken::new())
            .await
            .unwrap_err();

        let failures = err.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].code, "de");
        assert!(failures[0].reason.contains("worker panicked"));
        assert!(!dir.path().join("de.json").exists());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_makes_no_calls() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(EchoBackend::new("t"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let tasks = vec![LanguageTask::new(
            Language::from_code("de"),
            catalog(2),
            dir.path().join("de.json"),
        )];
        let summary = translate_documents(tasks, backend.clone(), &RunOptions::default(), cancel)
            .await
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(backend.calls(), 0);
        assert!(!dir.path().join("de.json").exists());
    }
}
