#![forbid(unsafe_code)]

//! Blocking client for the Gemini REST API: file upload, processing status,
//! content generation and model listing.

use crate::config::RuntimeSettings;
use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

const API_BASE: &str = "https://generativelanguage.googleapis.com";
const API_KEY_HEADER: &str = "x-goog-api-key";
const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_POLLS: u32 = 90;

/// Scene-by-scene description requested for downloaded videos.
pub fn scene_breakdown_prompt() -> &'static str {
    "Please describe the video in detail. Please include the following: \n\
     1. The times for every scene.\n\
     2. Describe the setup that is seen in each scene.\n\
     3. Provide a a list of the tools that are used in each scene.\n\
     4. Provide the actions that are taken in each scene.\n\
     5. Also provide what the narrator says in each scene.\n\
     6. Enumerate the scenes in the order they are seen in the video.\n"
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Processing,
    Active,
    Failed,
    Unspecified,
}

/// A file stored with the Files API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    state: Option<String>,
}

impl UploadedFile {
    pub fn state(&self) -> FileState {
        match self.state.as_deref() {
            Some("PROCESSING") => FileState::Processing,
            Some("ACTIVE") => FileState::Active,
            Some("FAILED") => FileState::Failed,
            _ => FileState::Unspecified,
        }
    }
}

#[derive(Deserialize)]
struct UploadEnvelope {
    file: UploadedFile,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelPage {
    #[serde(default)]
    models: Vec<ModelEntry>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ModelEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

pub struct GeminiClient {
    agent: ureq::Agent,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self {
            agent,
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    pub fn from_settings(settings: &RuntimeSettings) -> Result<Self> {
        let api_key = settings.gemini_api_key.clone().ok_or_else(|| {
            anyhow!(
                "no Gemini API key: set GEMINI_API_KEY or write it to {}",
                crate::config::GEMINI_KEY_FILE
            )
        })?;
        Ok(Self::new(api_key, settings.gemini_model.clone()))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Uploads `path` with the resumable protocol: a metadata request that
    /// returns an upload URL, then a single `upload, finalize` request.
    pub fn upload(&self, path: &Path, display_name: &str) -> Result<UploadedFile> {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        tracing::info!(file = %path.display(), mime = %mime, bytes = bytes.len(), "uploading to Gemini");

        let start = self
            .agent
            .post(&format!("{API_BASE}/upload/v1beta/files"))
            .set(API_KEY_HEADER, &self.api_key)
            .set("X-Goog-Upload-Protocol", "resumable")
            .set("X-Goog-Upload-Command", "start")
            .set("X-Goog-Upload-Header-Content-Length", &bytes.len().to_string())
            .set("X-Goog-Upload-Header-Content-Type", mime.essence_str())
            .send_json(json!({ "file": { "display_name": display_name } }))
            .map_err(|err| http_error(err, "starting upload"))?;
        let upload_url = start
            .header(UPLOAD_URL_HEADER)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("upload start response carried no {UPLOAD_URL_HEADER} header"))?;

        let finished = self
            .agent
            .post(&upload_url)
            .set("X-Goog-Upload-Offset", "0")
            .set("X-Goog-Upload-Command", "upload, finalize")
            .send_bytes(&bytes)
            .map_err(|err| http_error(err, "uploading file"))?;
        let envelope: UploadEnvelope = finished
            .into_json()
            .context("deserializing upload response")?;
        Ok(envelope.file)
    }

    pub fn get_file(&self, name: &str) -> Result<UploadedFile> {
        self.agent
            .get(&format!("{API_BASE}/v1beta/{name}"))
            .set(API_KEY_HEADER, &self.api_key)
            .call()
            .map_err(|err| http_error(err, "fetching file status"))?
            .into_json()
            .context("deserializing file status")
    }

    /// Polls `file` every `interval` until the service has processed it.
    pub fn wait_until_active(
        &self,
        file: UploadedFile,
        interval: Duration,
        max_polls: u32,
    ) -> Result<UploadedFile> {
        poll_until_active(file, interval, max_polls, |name| self.get_file(name))
    }

    /// Text of the first candidate for `prompt`, optionally about `file`.
    pub fn generate(&self, prompt: &str, file: Option<&UploadedFile>) -> Result<String> {
        let mut parts = vec![json!({ "text": prompt })];
        if let Some(file) = file {
            parts.push(json!({
                "file_data": {
                    "mime_type": file.mime_type.as_deref().unwrap_or("application/octet-stream"),
                    "file_uri": file.uri,
                }
            }));
        }
        let body = json!({ "contents": [{ "role": "user", "parts": parts }] });

        let response: Value = self
            .agent
            .post(&format!("{API_BASE}/v1beta/models/{}:generateContent", self.model))
            .set(API_KEY_HEADER, &self.api_key)
            .send_json(body)
            .map_err(|err| http_error(err, "generating content"))?
            .into_json()
            .context("deserializing generation response")?;
        response_text(response)
    }

    /// Full names (`models/...`) of every model the key can use.
    pub fn list_models(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .agent
                .get(&format!("{API_BASE}/v1beta/models"))
                .set(API_KEY_HEADER, &self.api_key)
                .query("pageSize", "1000");
            if let Some(token) = &page_token {
                request = request.query("pageToken", token);
            }
            let page: ModelPage = request
                .call()
                .map_err(|err| http_error(err, "listing models"))?
                .into_json()
                .context("deserializing model list")?;
            names.extend(page.models.into_iter().map(|model| model.name));
            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(names)
    }

    /// Upload, wait for processing and describe one video.
    pub fn describe_video(&self, path: &Path, prompt: &str) -> Result<String> {
        let display_name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        println!("Uploading file...");
        let uploaded = self.upload(path, &display_name)?;
        println!("Completed upload: {}", uploaded.uri);
        let active = self.wait_until_active(uploaded, DEFAULT_POLL_INTERVAL, DEFAULT_MAX_POLLS)?;
        println!("Making LLM inference request...");
        self.generate(prompt, Some(&active))
    }
}

/// Re-fetches the file through `refresh` while it is still processing.
pub fn poll_until_active(
    mut file: UploadedFile,
    interval: Duration,
    max_polls: u32,
    mut refresh: impl FnMut(&str) -> Result<UploadedFile>,
) -> Result<UploadedFile> {
    let mut polls = 0;
    while file.state() == FileState::Processing {
        if polls >= max_polls {
            bail!("{} still processing after {polls} status checks", file.name);
        }
        println!("Waiting for video to be processed.");
        thread::sleep(interval);
        file = refresh(&file.name)?;
        polls += 1;
    }
    if file.state() == FileState::Failed {
        bail!("processing of {} failed", file.name);
    }
    Ok(file)
}

fn response_text(raw: Value) -> Result<String> {
    let response: GenerateResponse =
        serde_json::from_value(raw).context("unexpected generation response shape")?;
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();
    if text.is_empty() {
        match response.prompt_feedback.and_then(|feedback| feedback.block_reason) {
            Some(reason) => bail!("prompt was blocked: {reason}"),
            None => bail!("Gemini returned no text"),
        }
    }
    Ok(text)
}

fn http_error(err: ureq::Error, what: &str) -> anyhow::Error {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            anyhow!("{what}: Gemini API returned {code}: {}", body.trim())
        }
        ureq::Error::Transport(transport) => anyhow!("{what}: {transport}"),
    }
}
