use async_trait::async_trait;
use facecrop::{
    is_accepted_media_type, records_from, CropConfig, CropPipeline, DetectionOptions,
    FaceBounds, FaceCropError, FaceDetector, FrameYield, ImageRecord, Progress, ProgressBar,
    ProgressLabel, RegionPolicy, RegionSource, SourceImage,
};
use image::RgbaImage;
use js_sys::{Array, Function, Object, Promise, Reflect, Uint8Array};
use serde::Deserialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

/// Options for a cropping batch, passed as a JavaScript object.
///
/// All fields are optional and default to the library defaults.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CropOptions {
    pub max_analysis_size: Option<u32>,
    pub group_size: Option<usize>,
    pub margin: Option<f64>,
    pub output_size: Option<u32>,
    pub analysis_quality: Option<u8>,
    pub interval: Option<u32>,
    pub min_neighbors: Option<u32>,
    pub region_policy: Option<String>,
}

/// Face box as returned by the JavaScript detector.
#[derive(Deserialize)]
struct JsFaceBox {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    #[serde(default)]
    confidence: f64,
}

/// Create a JS `Error` with a `code` property.
fn make_error(code: &str, message: &str) -> JsValue {
    let err = js_sys::Error::new(message);
    let _ = Reflect::set(&err, &"code".into(), &JsValue::from_str(code));
    JsValue::from(err)
}

/// Convert a `FaceCropError` into a JS `Error` with a machine-readable `code` property.
fn to_js_error(e: FaceCropError) -> JsValue {
    let code = match &e {
        FaceCropError::DecodeError(_) => "DECODE_ERROR",
        FaceCropError::ZeroDimensions => "ZERO_DIMENSIONS",
        FaceCropError::EncodeError(_) => "ENCODE_ERROR",
        FaceCropError::DetectionFailed(_) => "DETECTION_FAILED",
        FaceCropError::InvalidMaxAnalysisSize => "INVALID_MAX_ANALYSIS_SIZE",
        FaceCropError::InvalidGroupSize => "INVALID_GROUP_SIZE",
        FaceCropError::InvalidOutputSize => "INVALID_OUTPUT_SIZE",
        FaceCropError::InvalidMargin(_) => "INVALID_MARGIN",
        FaceCropError::InvalidQuality(_) => "INVALID_QUALITY",
    };
    make_error(code, &e.to_string())
}

fn describe(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| {
            value
                .dyn_ref::<js_sys::Error>()
                .map(|e| String::from(e.message()))
        })
        .unwrap_or_else(|| format!("{value:?}"))
}

fn is_absent(value: &JsValue) -> bool {
    value.is_undefined() || value.is_null()
}

fn string_to_region_policy(policy: &str) -> Result<RegionPolicy, JsValue> {
    match policy {
        "permissive" => Ok(RegionPolicy::Permissive),
        "clamp" => Ok(RegionPolicy::Clamp),
        _ => Err(make_error(
            "INVALID_OPTIONS",
            &format!("unknown region policy: {policy}"),
        )),
    }
}

fn parse_options(options: JsValue) -> Result<CropOptions, JsValue> {
    if is_absent(&options) {
        Ok(CropOptions::default())
    } else {
        serde_wasm_bindgen::from_value(options)
            .map_err(|e| make_error("INVALID_OPTIONS", &format!("invalid options: {e}")))
    }
}

/// Apply parsed `CropOptions` on top of the default `CropConfig`.
fn apply_options(opts: &CropOptions) -> Result<CropConfig, JsValue> {
    let mut config = CropConfig::default();
    if let Some(size) = opts.max_analysis_size {
        config = config.max_analysis_size(size);
    }
    if let Some(size) = opts.group_size {
        config = config.group_size(size);
    }
    if let Some(margin) = opts.margin {
        config = config.margin(margin);
    }
    if let Some(size) = opts.output_size {
        config = config.output_size(size);
    }
    if let Some(quality) = opts.analysis_quality {
        config = config.analysis_quality(quality);
    }
    let defaults = DetectionOptions::default();
    config = config.detection(DetectionOptions {
        interval: opts.interval.unwrap_or(defaults.interval),
        min_neighbors: opts.min_neighbors.unwrap_or(defaults.min_neighbors),
    });
    if let Some(ref policy) = opts.region_policy {
        config = config.region_policy(string_to_region_policy(policy)?);
    }
    config.validate().map_err(to_js_error)?;
    Ok(config)
}

/// Detector backed by a JavaScript function
/// `(rgba, width, height, {interval, minNeighbors}) => Promise<Box[]>`.
struct JsDetector {
    detect: Function,
}

#[async_trait(?Send)]
impl FaceDetector for JsDetector {
    async fn detect(
        &self,
        surface: &RgbaImage,
        options: &DetectionOptions,
    ) -> Result<Vec<FaceBounds>, FaceCropError> {
        let failed = |e: JsValue| FaceCropError::DetectionFailed(describe(&e));

        let hints = Object::new();
        Reflect::set(&hints, &"interval".into(), &JsValue::from(options.interval))
            .map_err(failed)?;
        Reflect::set(
            &hints,
            &"minNeighbors".into(),
            &JsValue::from(options.min_neighbors),
        )
        .map_err(failed)?;

        let args = Array::new();
        args.push(&Uint8Array::from(surface.as_raw().as_slice()));
        args.push(&JsValue::from(surface.width()));
        args.push(&JsValue::from(surface.height()));
        args.push(&hints);

        let returned = self.detect.apply(&JsValue::NULL, &args).map_err(failed)?;
        let resolved = JsFuture::from(Promise::resolve(&returned))
            .await
            .map_err(failed)?;
        if is_absent(&resolved) {
            return Ok(Vec::new());
        }

        let boxes: Vec<JsFaceBox> = serde_wasm_bindgen::from_value(resolved)
            .map_err(|e| FaceCropError::DetectionFailed(format!("invalid face boxes: {e}")))?;
        Ok(boxes
            .into_iter()
            .map(|b| FaceBounds {
                x: b.x,
                y: b.y,
                width: b.width,
                height: b.height,
                confidence: b.confidence,
            })
            .collect())
    }
}

/// Writes `max` and `value` onto a JS object such as `<progress>`.
struct JsProgressBar {
    target: JsValue,
}

impl ProgressBar for JsProgressBar {
    fn set_max(&mut self, max: usize) {
        let _ = Reflect::set(&self.target, &"max".into(), &JsValue::from(max as f64));
    }

    fn set_value(&mut self, value: usize) {
        let _ = Reflect::set(&self.target, &"value".into(), &JsValue::from(value as f64));
    }
}

/// Writes `innerText` onto a JS object such as a `<span>`.
struct JsProgressLabel {
    target: JsValue,
}

impl ProgressLabel for JsProgressLabel {
    fn set_text(&mut self, text: &str) {
        let _ = Reflect::set(&self.target, &"innerText".into(), &JsValue::from_str(text));
    }
}

/// Waits for the next animation frame, or a microtask where
/// `requestAnimationFrame` is unavailable.
struct AnimationFrame;

#[async_trait(?Send)]
impl FrameYield for AnimationFrame {
    async fn next_frame(&self) {
        let promise = Promise::new(&mut |resolve, _reject| {
            let global = js_sys::global();
            let raf = Reflect::get(&global, &"requestAnimationFrame".into())
                .ok()
                .and_then(|f| f.dyn_into::<Function>().ok());
            let _ = match raf {
                Some(raf) => raf.call1(&global, &resolve),
                None => resolve.call0(&JsValue::NULL),
            };
        });
        let _ = JsFuture::from(promise).await;
    }
}

fn get_string(value: &JsValue, key: &str) -> String {
    Reflect::get(value, &key.into())
        .ok()
        .and_then(|v| v.as_string())
        .unwrap_or_default()
}

/// Read the bytes of a `{data: Uint8Array}` object or a `Blob`/`File`.
async fn read_bytes(file: &JsValue) -> Result<Vec<u8>, JsValue> {
    let data = Reflect::get(file, &"data".into())?;
    if let Some(bytes) = data.dyn_ref::<Uint8Array>() {
        return Ok(bytes.to_vec());
    }

    let array_buffer = Reflect::get(file, &"arrayBuffer".into())?
        .dyn_into::<Function>()
        .map_err(|_| make_error("INVALID_INPUT", "input has neither data nor arrayBuffer()"))?;
    let buffer = JsFuture::from(Promise::resolve(&array_buffer.call0(file)?)).await?;
    Ok(Uint8Array::new(&buffer).to_vec())
}

/// Turn host file objects into source images, skipping unsupported types
/// before any bytes are read.
///
/// A file that cannot be read keeps its place with empty data, so the
/// pipeline reports it as failed instead of aborting the batch.
async fn collect_sources(files: &Array) -> Vec<SourceImage> {
    let mut sources = Vec::new();
    for file in files.iter() {
        let media_type = get_string(&file, "type");
        if !is_accepted_media_type(&media_type) {
            continue;
        }
        let name = get_string(&file, "name");
        let data = read_bytes(&file).await.unwrap_or_default();
        sources.push(SourceImage::new(name, media_type, data));
    }
    sources
}

fn build_image_object(name: &str, media_type: &str, data: &[u8]) -> Result<JsValue, JsValue> {
    let obj = Object::new();
    Reflect::set(&obj, &"name".into(), &JsValue::from_str(name))?;
    Reflect::set(&obj, &"type".into(), &JsValue::from_str(media_type))?;
    Reflect::set(&obj, &"data".into(), &Uint8Array::from(data))?;
    Ok(JsValue::from(obj))
}

/// Build a plain JS object from an `ImageRecord`.
fn build_record_object(record: &ImageRecord) -> Result<JsValue, JsValue> {
    let obj = Object::new();
    let original = &record.original;
    Reflect::set(
        &obj,
        &"original".into(),
        &build_image_object(&original.name, &original.media_type, &original.data)?,
    )?;
    Reflect::set(&obj, &"failed".into(), &JsValue::from(record.failed))?;
    Reflect::set(&obj, &"scale".into(), &JsValue::from(record.scale_factor))?;
    Reflect::set(&obj, &"width".into(), &JsValue::from(record.final_width))?;
    Reflect::set(&obj, &"height".into(), &JsValue::from(record.final_height))?;
    Reflect::set(
        &obj,
        &"faceCount".into(),
        &JsValue::from(record.faces.len() as u32),
    )?;

    let crop = match record.crop.as_ref() {
        Some(image) => build_image_object(&image.name, &image.media_type, &image.data)?,
        None => JsValue::NULL,
    };
    Reflect::set(&obj, &"crop".into(), &crop)?;

    let region = match record.region.as_ref() {
        Some(region) => {
            let region_obj = Object::new();
            Reflect::set(&region_obj, &"x".into(), &JsValue::from(region.x))?;
            Reflect::set(&region_obj, &"y".into(), &JsValue::from(region.y))?;
            Reflect::set(&region_obj, &"size".into(), &JsValue::from(region.size))?;
            Reflect::set(
                &region_obj,
                &"fromFace".into(),
                &JsValue::from(region.source == RegionSource::Face),
            )?;
            JsValue::from(region_obj)
        }
        None => JsValue::NULL,
    };
    Reflect::set(&obj, &"region".into(), &region)?;

    Ok(JsValue::from(obj))
}

/// Crop a batch of images to face-centered squares.
///
/// @param files - Array of `File`s or `{name, type, data: Uint8Array}` objects
/// @param detector - `(rgba, width, height, {interval, minNeighbors}) => Promise<{x, y, width, height}[]>`
/// @param progress - Optional object receiving `max` and `value` (e.g. `<progress>`)
/// @param progressText - Optional object receiving `innerText` percentages
/// @param onImageReady - Optional callback invoked with each finished record
/// @param options - Optional object with fields: maxAnalysisSize, groupSize,
///   margin, outputSize, analysisQuality, interval, minNeighbors, regionPolicy
#[wasm_bindgen(js_name = "processImages")]
pub async fn process_images(
    files: Array,
    detector: Function,
    progress: JsValue,
    progress_text: JsValue,
    on_image_ready: JsValue,
    options: JsValue,
) -> Result<Array, JsValue> {
    let config = apply_options(&parse_options(options)?)?;
    let on_image_ready = on_image_ready.dyn_into::<Function>().ok();

    let mut records = records_from(collect_sources(&files).await);

    let mut bar = (!is_absent(&progress)).then(|| JsProgressBar { target: progress });
    let mut label =
        (!is_absent(&progress_text)).then(|| JsProgressLabel { target: progress_text });
    let mut tracker = Progress::none();
    if let Some(bar) = bar.as_mut() {
        tracker = tracker.bar(bar);
    }
    if let Some(label) = label.as_mut() {
        tracker = tracker.label(label);
    }

    let pipeline = CropPipeline::new(Box::new(JsDetector { detect: detector }))
        .config(config)
        .frame_yield(Box::new(AnimationFrame));
    pipeline
        .run(&mut records, &mut tracker, |record| {
            if let Some(callback) = on_image_ready.as_ref() {
                if let Ok(obj) = build_record_object(record) {
                    let _ = callback.call1(&JsValue::NULL, &obj);
                }
            }
        })
        .await
        .map_err(to_js_error)?;

    let results = Array::new();
    for record in &records {
        results.push(&build_record_object(record)?);
    }
    Ok(results)
}
