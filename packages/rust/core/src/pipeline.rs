//! Session pipeline: submission → adapter → normalize → generate →
//! validate → catalog.
//!
//! A [`Session`] owns the catalog for one user session. Each submission
//! builds its own product set and joins the catalog only when every product
//! has copy; a failed or timed-out submission leaves the catalog untouched.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, info, instrument, warn};

use copyforge_shared::{
    AppConfig, Category, CopyOrigin, CopyforgeError, Descriptions, PipelineSettings, Product,
    ProductId, Result, SpecValue, TabularCopy, validate_api_key,
};
use copyforge_sources::{Capabilities, SourceAdapter, SourceInput};

use crate::generation::{ContentGenerator, GenerationSettings};
use crate::normalize::Normalizer;
use crate::openai::OpenAiCompatibleModel;
use crate::single_flight::SingleFlight;
use crate::validation::{Validator, Violation};

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting submission status.
pub trait ProgressReporter: Send + Sync {
    /// Called when the adapter starts reading the input.
    fn adapter_started(&self, adapter: &str);
    /// Called when copy generation starts for a product.
    fn generation_started(&self, product: &Product, current: usize, total: usize);
    /// Called when the submission's products have joined the catalog.
    fn completed(&self, products: &[Product]);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn adapter_started(&self, _adapter: &str) {}
    fn generation_started(&self, _product: &Product, _current: usize, _total: usize) {}
    fn completed(&self, _products: &[Product]) {}
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// One user submission: an input and the category label it belongs to.
#[derive(Debug, Clone)]
pub struct Submission {
    pub input: SourceInput,
    pub category: String,
}

/// Field-by-field user edit. `None` leaves a field as it is; the id is
/// never editable.
#[derive(Debug, Clone, Default)]
pub struct ProductEdit {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub category: Option<String>,
    pub features: Option<Vec<String>>,
    pub specifications: Option<BTreeMap<String, SpecValue>>,
    pub descriptions: Option<Descriptions>,
    pub seo_keywords: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Products keyed by id, listed in insertion order.
#[derive(Default)]
struct Catalog {
    order: Vec<ProductId>,
    products: HashMap<ProductId, Product>,
}

impl Catalog {
    fn extend(&mut self, products: &[Product]) {
        for product in products {
            if self
                .products
                .insert(product.id.clone(), product.clone())
                .is_none()
            {
                self.order.push(product.id.clone());
            }
        }
    }

    fn list(&self) -> Vec<Product> {
        self.order
            .iter()
            .filter_map(|id| self.products.get(id))
            .cloned()
            .collect()
    }

    fn clear(&mut self) {
        self.order.clear();
        self.products.clear();
    }
}

fn not_found(id: &ProductId) -> CopyforgeError {
    CopyforgeError::NotFound(id.to_string())
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct Session {
    capabilities: Capabilities,
    settings: PipelineSettings,
    normalizer: Normalizer,
    generator: ContentGenerator,
    validator: Validator,
    catalog: RwLock<Catalog>,
    flights: SingleFlight<ProductId>,
}

impl Session {
    pub fn new(
        capabilities: Capabilities,
        settings: PipelineSettings,
        generation: GenerationSettings,
    ) -> Self {
        let generator = ContentGenerator::new(capabilities.language_model.clone(), generation);
        let validator = Validator::new(&settings.extra_banned_phrases);
        Self {
            capabilities,
            settings,
            normalizer: Normalizer::new(),
            generator,
            validator,
            catalog: RwLock::new(Catalog::default()),
            flights: SingleFlight::new(),
        }
    }

    /// Wire the configured HTTP services and, unless `offline`, the
    /// language model. A missing API key means template copy only.
    pub fn from_config(config: &AppConfig, offline: bool) -> Result<Self> {
        let mut capabilities = Capabilities::from_config(config)?;
        if !offline {
            match validate_api_key(config) {
                Ok(key) => {
                    let model = OpenAiCompatibleModel::from_config(&config.generation, key)?;
                    capabilities = capabilities.with_language_model(Arc::new(model));
                }
                Err(e) => warn!(error = %e, "no language model, using template copy"),
            }
        }
        Ok(Self::new(
            capabilities,
            PipelineSettings::from(config),
            GenerationSettings::from(config),
        ))
    }

    /// Whether copy comes from a language model (otherwise the template).
    pub fn has_language_model(&self) -> bool {
        self.generator.has_model()
    }

    /// Run one submission to completion and add its products to the catalog.
    ///
    /// 1. Category and input checks (no external call before these pass)
    /// 2. Adapter → candidates
    /// 3. Normalize
    /// 4. Generate, validate, regenerate, clamp (bounded concurrency)
    /// 5. Append to the catalog
    #[instrument(skip_all, fields(kind = %submission.input.kind(), category = %submission.category))]
    pub async fn submit(
        &self,
        submission: Submission,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<Product>> {
        let start = Instant::now();
        let category: Category = submission.category.parse()?;
        submission.input.validate(&self.settings)?;

        let budget = self.settings.submission_timeout;
        let products = tokio::time::timeout(budget, self.run(submission.input, category, progress))
            .await
            .map_err(|_| CopyforgeError::timeout("submission", budget.as_secs()))??;

        self.catalog.write().await.extend(&products);
        info!(
            products = products.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "submission complete"
        );
        progress.completed(&products);
        Ok(products)
    }

    async fn run(
        &self,
        input: SourceInput,
        category: Category,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<Product>> {
        let adapter = SourceAdapter::select(input.kind(), &self.capabilities, &self.settings);
        progress.adapter_started(adapter.name());

        let candidates = adapter.execute(input, category).await?;
        if candidates.is_empty() {
            return Err(CopyforgeError::no_content(format!(
                "the {} input held no recognisable product",
                adapter.name()
            )));
        }
        info!(adapter = adapter.name(), candidates = candidates.len(), "candidates extracted");

        let products: Vec<Product> = candidates
            .into_iter()
            .map(|c| self.normalizer.normalize(c, category))
            .collect();

        let total = products.len();
        let permits = Semaphore::new(self.settings.generation_concurrency.max(1));
        let tasks = products.into_iter().enumerate().map(|(i, product)| {
            let permits = &permits;
            async move {
                let _permit = permits
                    .acquire()
                    .await
                    .map_err(|e| CopyforgeError::Generation(e.to_string()))?;
                progress.generation_started(&product, i + 1, total);
                Ok::<_, CopyforgeError>(self.with_copy(product).await)
            }
        });
        join_all(tasks).await.into_iter().collect()
    }

    /// Attach description copy to a freshly normalized product.
    async fn with_copy(&self, mut product: Product) -> Product {
        let keep_supplied = self.settings.tabular_copy == TabularCopy::KeepSupplied
            && product.copy_origin == CopyOrigin::Supplied;

        if keep_supplied {
            let result = self.validator.validate(&product.descriptions);
            if !result.passed() {
                debug!(id = %product.id, violations = result.violations.len(), "clamping supplied copy");
                product.descriptions = self.validator.clamp(&product.descriptions, &product);
                product.copy_origin = CopyOrigin::Clamped;
            }
            return product;
        }

        let (descriptions, origin) = self.settle_copy(&product).await;
        product.descriptions = descriptions;
        product.copy_origin = origin;
        product
    }

    /// Generate and validate, regenerating model copy up to the configured
    /// limit, then clamp whatever still fails.
    async fn settle_copy(&self, product: &Product) -> (Descriptions, CopyOrigin) {
        let mut violations: Vec<Violation> = Vec::new();
        let mut regenerations = 0;
        loop {
            let copy = self.generator.generate(product, &violations).await;
            let result = self.validator.validate(&copy.descriptions);
            if result.passed() {
                return (copy.descriptions, copy.origin);
            }

            violations = result.violations;
            let summary: Vec<String> = violations.iter().map(ToString::to_string).collect();
            warn!(
                id = %product.id,
                regenerations,
                violations = %summary.join("; "),
                "copy failed validation"
            );

            if copy.origin != CopyOrigin::Generated
                || regenerations >= self.settings.max_regenerations
            {
                let clamped = self.validator.clamp(&copy.descriptions, product);
                return (clamped, CopyOrigin::Clamped);
            }
            regenerations += 1;
        }
    }

    /// Regenerate one product's copy. Other fields and the id are kept.
    /// Calls for the same id run one at a time.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn regenerate(&self, id: &ProductId) -> Result<Product> {
        let _flight = self.flights.acquire(id).await;
        let product = self.get(id).await?;

        let (descriptions, origin) = self.settle_copy(&product).await;

        let mut catalog = self.catalog.write().await;
        let entry = catalog.products.get_mut(id).ok_or_else(|| not_found(id))?;
        entry.descriptions = descriptions;
        entry.copy_origin = origin;
        info!(origin = ?origin, "copy regenerated");
        Ok(entry.clone())
    }

    /// Apply a user edit. Edited copy is validated and clamped if needed.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn edit(&self, id: &ProductId, edit: ProductEdit) -> Result<Product> {
        let category = edit
            .category
            .as_deref()
            .map(str::parse::<Category>)
            .transpose()?;
        if edit.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(CopyforgeError::input("product name cannot be empty"));
        }

        let _flight = self.flights.acquire(id).await;
        let mut catalog = self.catalog.write().await;
        let entry = catalog.products.get_mut(id).ok_or_else(|| not_found(id))?;

        if let Some(name) = edit.name {
            entry.name = name.trim().to_string();
        }
        if let Some(brand) = edit.brand {
            entry.brand = brand.trim().to_string();
        }
        if let Some(sku) = edit.sku {
            entry.sku = sku.trim().to_string();
        }
        if let Some(barcode) = edit.barcode {
            entry.barcode = barcode.trim().to_string();
        }
        if category.is_some() {
            entry.category = category;
        }
        if let Some(features) = edit.features {
            entry.features = features;
        }
        if let Some(specifications) = edit.specifications {
            entry.specifications = specifications;
        }
        if let Some(keywords) = edit.seo_keywords {
            entry.seo_keywords = keywords
                .into_iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
        }
        if let Some(descriptions) = edit.descriptions {
            if self.validator.validate(&descriptions).passed() {
                entry.descriptions = descriptions;
                entry.copy_origin = CopyOrigin::Edited;
            } else {
                entry.descriptions = self.validator.clamp(&descriptions, entry);
                entry.copy_origin = CopyOrigin::Clamped;
            }
        }
        debug!("product edited");
        Ok(entry.clone())
    }

    /// Ask the model for search keywords and a meta seed for one product and
    /// keep them as hints for its next generation. Copy is not regenerated.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn suggest_keywords(&self, id: &ProductId) -> Result<Product> {
        let _flight = self.flights.acquire(id).await;
        let product = self.get(id).await?;

        let seo = self.generator.seo_keywords(&product.name, &product.brand).await;
        if seo.is_empty() {
            return Err(CopyforgeError::Generation(format!(
                "no keyword suggestions for '{}'",
                product.name
            )));
        }

        let mut catalog = self.catalog.write().await;
        let entry = catalog.products.get_mut(id).ok_or_else(|| not_found(id))?;
        entry.seo_keywords = seo.keywords;
        entry.seo_meta_seed = seo.meta_description;
        info!(keywords = entry.seo_keywords.len(), "keywords suggested");
        Ok(entry.clone())
    }

    pub async fn get(&self, id: &ProductId) -> Result<Product> {
        self.catalog
            .read()
            .await
            .products
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    /// All products, in the order they were added.
    pub async fn products(&self) -> Vec<Product> {
        self.catalog.read().await.list()
    }

    pub async fn export_csv(&self) -> Result<Vec<u8>> {
        copyforge_export::export_csv(&self.products().await)
    }

    pub async fn export_json(&self) -> Result<String> {
        copyforge_export::export_json(&self.products().await)
    }

    /// Drop every product from the catalog.
    pub async fn reset(&self) {
        self.catalog.write().await.clear();
        info!("catalog cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use url::Url;

    use copyforge_shared::{
        CapabilityError, LanguageModel, PageFetcher, Prompt, SourceErrorKind,
    };

    const SAUCEPAN: &str = "Stainless Steel Saucepan 20cm, Le Creuset, triple layer base";

    const INFERRED: &str = r#"{"name": "Stainless Steel Saucepan 20cm", "brand": "Le Creuset", "features": ["triple layer base"]}"#;

    const GOOD: &str = r#"{"short_html": "<p>Triple layer base<br>Even heat on every hob<br>Stainless steel finish</p>",
"long_html": "<p>A stainless steel saucepan from Le Creuset for simmering sauces and soups.</p><p>The triple layer base spreads heat evenly.</p>"}"#;

    const SEO: &str = r#"{"keywords": ["stainless steel saucepan", "induction saucepan"],
"description": "A Le Creuset stainless steel saucepan for even heat on every hob."}"#;

    const BANNED: &str = r#"{"short_html": "<p>Buy now<br>Great price<br>Fast delivery</p>",
"long_html": "<p>Shop the saucepan today.</p>"}"#;

    /// Answers field inference with `INFERRED` and copy requests from a
    /// script (the last reply repeats).
    struct ScriptedModel {
        replies: Mutex<VecDeque<&'static str>>,
        last: &'static str,
        copy_prompts: Mutex<Vec<Prompt>>,
        active: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedModel {
        fn new(replies: &[&'static str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().copied().collect()),
                last: replies.last().copied().unwrap_or(GOOD),
                copy_prompts: Mutex::new(Vec::new()),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }

        fn slow(reply: &'static str, delay: Duration) -> Arc<Self> {
            let mut model = Arc::into_inner(Self::new(&[reply])).unwrap();
            model.delay = delay;
            Arc::new(model)
        }

        fn copy_calls(&self) -> usize {
            self.copy_prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, prompt: &Prompt) -> std::result::Result<String, CapabilityError> {
            if prompt.system.contains("extract product fields") {
                return Ok(INFERRED.to_string());
            }
            if prompt.system.contains("search keywords") {
                return Ok(SEO.to_string());
            }
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);

            self.copy_prompts.lock().unwrap().push(prompt.clone());
            let reply = self.replies.lock().unwrap().pop_front().unwrap_or(self.last);
            Ok(reply.to_string())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct SlowFetcher;

    #[async_trait]
    impl PageFetcher for SlowFetcher {
        async fn fetch(&self, _url: &Url) -> std::result::Result<String, CapabilityError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("<h1>Pan</h1>".into())
        }
    }

    /// Records every notification in arrival order.
    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<String>>,
    }

    impl ProgressReporter for RecordingProgress {
        fn adapter_started(&self, adapter: &str) {
            self.events.lock().unwrap().push(format!("adapter {adapter}"));
        }

        fn generation_started(&self, product: &Product, current: usize, total: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("generate {current}/{total} {}", product.name));
        }

        fn completed(&self, products: &[Product]) {
            self.events
                .lock()
                .unwrap()
                .push(format!("completed {}", products.len()));
        }
    }

    fn tabular(rows: &[&str]) -> Submission {
        let mut csv = String::from("Name,SKU\n");
        for (i, name) in rows.iter().enumerate() {
            csv.push_str(&format!("{name},MC-{i:02}\n"));
        }
        Submission {
            input: SourceInput::Tabular {
                bytes: csv.into_bytes(),
                file_name: Some("rows.csv".into()),
            },
            category: "Dining, Drink, Living".into(),
        }
    }

    fn session_with(model: Option<Arc<ScriptedModel>>, settings: PipelineSettings) -> Session {
        let mut caps = Capabilities::default();
        if let Some(model) = model {
            caps = caps.with_language_model(model);
        }
        Session::new(caps, settings, GenerationSettings::default())
    }

    fn session(model: Option<Arc<ScriptedModel>>) -> Session {
        session_with(model, PipelineSettings::default())
    }

    fn free_text(text: &str, category: &str) -> Submission {
        Submission {
            input: SourceInput::FreeText { text: text.into() },
            category: category.into(),
        }
    }

    #[tokio::test]
    async fn saucepan_from_free_text() {
        let model = ScriptedModel::new(&[GOOD]);
        let session = session(Some(model.clone()));

        let products = session
            .submit(free_text(SAUCEPAN, "Bakeware, Cookware"), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(products.len(), 1);
        let p = &products[0];
        assert_eq!(p.name, "Stainless Steel Saucepan 20cm");
        assert_eq!(p.brand, "Le Creuset");
        assert_eq!(p.category, Some(Category::BakewareCookware));
        assert_eq!(p.copy_origin, CopyOrigin::Generated);
        assert_eq!(
            p.descriptions.meta_description,
            "A stainless steel saucepan from Le Creuset for simmering sauces and soups."
        );
        assert!(Validator::default().validate(&p.descriptions).passed());
        assert_eq!(model.copy_calls(), 1);

        let csv = session.export_csv().await.unwrap();
        let mut reader = csv::Reader::from_reader(&csv[3..]);
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][3], "Stainless Steel Saucepan 20cm");
    }

    #[tokio::test]
    async fn unknown_category_is_rejected_before_any_call() {
        let model = ScriptedModel::new(&[GOOD]);
        let session = session(Some(model.clone()));

        let err = session
            .submit(free_text(SAUCEPAN, "Garden Furniture"), &SilentProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, CopyforgeError::Input { .. }));
        assert_eq!(model.copy_calls(), 0);
        assert!(session.products().await.is_empty());
    }

    #[tokio::test]
    async fn empty_extraction_is_no_content() {
        let session = session(None);
        let submission = Submission {
            input: SourceInput::Tabular {
                bytes: b"Name,SKU\n".to_vec(),
                file_name: Some("empty.csv".into()),
            },
            category: "Food Prep & Tools".into(),
        };
        let err = session.submit(submission, &SilentProgress).await.unwrap_err();
        assert_eq!(err.source_kind(), Some(SourceErrorKind::NoContentFound));
        assert!(session.products().await.is_empty());
    }

    #[tokio::test]
    async fn violations_are_fed_back_then_clamped() {
        let model = ScriptedModel::new(&[BANNED]);
        let session = session(Some(model.clone()));

        let products = session
            .submit(free_text(SAUCEPAN, "Bakeware, Cookware"), &SilentProgress)
            .await
            .unwrap();

        // first attempt plus two regenerations
        assert_eq!(model.copy_calls(), 3);
        let prompts = model.copy_prompts.lock().unwrap();
        assert!(!prompts[0].user.contains("Previous attempt violated"));
        assert!(prompts[1].user.contains("banned term"));

        let p = &products[0];
        assert_eq!(p.copy_origin, CopyOrigin::Clamped);
        assert!(Validator::default().validate(&p.descriptions).passed());
    }

    #[tokio::test]
    async fn regeneration_can_recover() {
        let model = ScriptedModel::new(&[BANNED, GOOD]);
        let session = session(Some(model.clone()));

        let products = session
            .submit(free_text(SAUCEPAN, "Bakeware, Cookware"), &SilentProgress)
            .await
            .unwrap();
        assert_eq!(model.copy_calls(), 2);
        assert_eq!(products[0].copy_origin, CopyOrigin::Generated);
    }

    #[tokio::test]
    async fn template_copy_without_model() {
        let session = session(None);
        assert!(!session.has_language_model());
        let products = session
            .submit(free_text(SAUCEPAN, "bakeware-cookware"), &SilentProgress)
            .await
            .unwrap();
        let p = &products[0];
        assert_eq!(p.copy_origin, CopyOrigin::Fallback);
        assert!(Validator::default().validate(&p.descriptions).passed());
        assert!(p.descriptions.meta_description.contains("by Le Creuset"));
    }

    #[tokio::test]
    async fn regenerate_keeps_identity() {
        let model = ScriptedModel::new(&[BANNED, BANNED, BANNED, GOOD]);
        let session = session(Some(model.clone()));
        let first = session
            .submit(free_text(SAUCEPAN, "Bakeware, Cookware"), &SilentProgress)
            .await
            .unwrap()
            .remove(0);
        assert_eq!(first.copy_origin, CopyOrigin::Clamped);

        let again = session.regenerate(&first.id).await.unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.name, first.name);
        assert_eq!(again.copy_origin, CopyOrigin::Generated);
        assert_ne!(again.descriptions, first.descriptions);
        assert_eq!(session.get(&first.id).await.unwrap(), again);

        let err = session.regenerate(&ProductId::new("txt-missing")).await.unwrap_err();
        assert!(matches!(err, CopyforgeError::NotFound(_)));
    }

    #[tokio::test]
    async fn concurrent_regenerations_are_serialized() {
        let model = ScriptedModel::slow(GOOD, Duration::from_millis(30));
        let session = session(Some(model.clone()));
        let id = session
            .submit(free_text(SAUCEPAN, "Bakeware, Cookware"), &SilentProgress)
            .await
            .unwrap()[0]
            .id
            .clone();

        let (a, b) = tokio::join!(session.regenerate(&id), session.regenerate(&id));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(model.peak.load(Ordering::SeqCst), 1);
        assert_eq!(session.products().await.len(), 1);
    }

    #[tokio::test]
    async fn supplied_tabular_copy_is_kept() {
        let model = ScriptedModel::new(&[GOOD]);
        let settings = PipelineSettings {
            tabular_copy: TabularCopy::KeepSupplied,
            ..PipelineSettings::default()
        };
        let session = session_with(Some(model.clone()), settings);
        let csv = "Name,SKU,Short Description\n\
                   Pie Dish,MC-01,Deep ceramic dish\n\
                   Mixing Bowl,MC-02,\n";
        let submission = Submission {
            input: SourceInput::Tabular {
                bytes: csv.as_bytes().to_vec(),
                file_name: None,
            },
            category: "Bakeware, Cookware".into(),
        };
        let products = session.submit(submission, &SilentProgress).await.unwrap();

        assert_eq!(products.len(), 2);
        assert_eq!(model.copy_calls(), 1);
        let dish = &products[0];
        assert_eq!(dish.copy_origin, CopyOrigin::Clamped);
        assert_eq!(dish.descriptions.short_description, "<p>Deep ceramic dish</p>");
        assert_eq!(dish.descriptions.meta_description, "Deep ceramic dish.");
        assert!(Validator::default().validate(&dish.descriptions).passed());
        assert_eq!(products[1].copy_origin, CopyOrigin::Generated);
    }

    #[tokio::test]
    async fn submission_timeout_leaves_catalog_untouched() {
        let caps = Capabilities {
            fetcher: Some(Arc::new(SlowFetcher)),
            ..Capabilities::default()
        };
        let settings = PipelineSettings {
            submission_timeout: Duration::from_millis(50),
            ..PipelineSettings::default()
        };
        let session = Session::new(caps, settings, GenerationSettings::default());
        let submission = Submission {
            input: SourceInput::Page {
                url: "https://shop.example.com/p/pan".into(),
            },
            category: "Bakeware, Cookware".into(),
        };
        let err = session.submit(submission, &SilentProgress).await.unwrap_err();
        assert!(matches!(err, CopyforgeError::Timeout { .. }));
        assert!(session.products().await.is_empty());
    }

    #[tokio::test]
    async fn edits_apply_field_by_field() {
        let session = session(None);
        let id = session
            .submit(free_text(SAUCEPAN, "Bakeware, Cookware"), &SilentProgress)
            .await
            .unwrap()[0]
            .id
            .clone();

        let err = session
            .edit(
                &id,
                ProductEdit {
                    category: Some("Garden".into()),
                    ..ProductEdit::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CopyforgeError::Input { .. }));

        let edited = session
            .edit(
                &id,
                ProductEdit {
                    sku: Some("LC-20".into()),
                    category: Some("Food Prep & Tools".into()),
                    descriptions: Some(Descriptions {
                        short_description: "Gray enamel".into(),
                        long_description: String::new(),
                        meta_description: "A gray saucepan.".into(),
                    }),
                    ..ProductEdit::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.id, id);
        assert_eq!(edited.sku, "LC-20");
        assert_eq!(edited.name, "Stainless Steel Saucepan 20cm");
        assert_eq!(edited.category, Some(Category::FoodPrepTools));
        assert_eq!(edited.copy_origin, CopyOrigin::Clamped);
        assert_eq!(edited.descriptions.short_description, "<p>Grey enamel</p>");
        assert_eq!(edited.descriptions.meta_description, "A grey saucepan.");
    }

    #[tokio::test]
    async fn progress_is_reported_in_stage_order() {
        let session = session(None);
        let progress = RecordingProgress::default();
        session
            .submit(tabular(&["Glass Teapot", "Enamel Jug", "Stoneware Mug"]), &progress)
            .await
            .unwrap();

        let events = progress.events.lock().unwrap().clone();
        assert_eq!(events.len(), 5);
        assert_eq!(events[0], "adapter tabular-file");
        let mut generated = events[1..4].to_vec();
        generated.sort();
        assert_eq!(
            generated,
            vec![
                "generate 1/3 Glass Teapot",
                "generate 2/3 Enamel Jug",
                "generate 3/3 Stoneware Mug"
            ]
        );
        assert_eq!(events[4], "completed 3");
    }

    #[tokio::test]
    async fn failed_submission_never_reports_completion() {
        let session = session(None);
        let progress = RecordingProgress::default();
        let submission = Submission {
            input: SourceInput::Tabular {
                bytes: b"Name,SKU\n".to_vec(),
                file_name: None,
            },
            category: "Clothing".into(),
        };
        session.submit(submission, &progress).await.unwrap_err();
        assert_eq!(*progress.events.lock().unwrap(), vec!["adapter tabular-file"]);
    }

    #[tokio::test]
    async fn generation_respects_concurrency_cap() {
        let model = ScriptedModel::slow(GOOD, Duration::from_millis(40));
        let settings = PipelineSettings {
            generation_concurrency: 2,
            ..PipelineSettings::default()
        };
        let session = session_with(Some(model.clone()), settings);

        let products = session
            .submit(
                tabular(&["Glass Teapot", "Enamel Jug", "Stoneware Mug", "Cake Stand", "Tea Towel"]),
                &SilentProgress,
            )
            .await
            .unwrap();

        assert_eq!(products.len(), 5);
        assert_eq!(model.copy_calls(), 5);
        let peak = model.peak.load(Ordering::SeqCst);
        assert!(peak <= 2, "peak {peak} exceeds the cap");
        assert!(peak > 1, "generation never overlapped");
    }

    #[tokio::test]
    async fn suggested_keywords_feed_the_next_generation() {
        let model = ScriptedModel::new(&[GOOD]);
        let session = session(Some(model.clone()));
        let id = session
            .submit(free_text(SAUCEPAN, "Bakeware, Cookware"), &SilentProgress)
            .await
            .unwrap()[0]
            .id
            .clone();

        let suggested = session.suggest_keywords(&id).await.unwrap();
        assert_eq!(
            suggested.seo_keywords,
            vec!["stainless steel saucepan", "induction saucepan"]
        );
        assert_eq!(
            suggested.seo_meta_seed.as_deref(),
            Some("A Le Creuset stainless steel saucepan for even heat on every hob.")
        );

        session.regenerate(&id).await.unwrap();
        let prompts = model.copy_prompts.lock().unwrap();
        assert!(!prompts[0].user.contains("Search hints"));
        assert!(prompts.last().unwrap().user.contains("induction saucepan"));
    }

    #[tokio::test]
    async fn keyword_suggestions_need_a_model() {
        let session = session(None);
        let id = session
            .submit(free_text("Enamel Jug, white", "Dining, Drink, Living"), &SilentProgress)
            .await
            .unwrap()[0]
            .id
            .clone();
        let err = session.suggest_keywords(&id).await.unwrap_err();
        assert!(matches!(err, CopyforgeError::Generation(_)));

        let edited = session
            .edit(
                &id,
                ProductEdit {
                    seo_keywords: Some(vec![" enamel jug ".into(), "".into()]),
                    ..ProductEdit::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.seo_keywords, vec!["enamel jug"]);
    }

    #[tokio::test]
    async fn catalog_keeps_insertion_order_and_resets() {
        let session = session(None);
        for text in ["Glass Teapot 1L", "Enamel Jug", "Cake Tin 20cm"] {
            session
                .submit(free_text(text, "Dining, Drink, Living"), &SilentProgress)
                .await
                .unwrap();
        }
        let names: Vec<String> = session.products().await.into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Glass Teapot 1L", "Enamel Jug", "Cake Tin 20cm"]);

        session.reset().await;
        assert!(session.products().await.is_empty());
    }
}
