//! Shared test doubles for the appliance.
//!
//! - [`FakeAppliance`]: scripted in-memory [`Appliance`] that "mounts" by
//!   writing the test file into a temp directory
//! - [`MockServer`]: tiny_http server answering the appliance HTTP API

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use spx_restore::appliance::{
    Appliance, ApplianceError, Image, Job, MountRequest, MountedImage, UnmountRequest,
};
use tiny_http::{Response, Server};

// =============================================================================
// Scripted in-memory appliance
// =============================================================================

/// In-memory appliance with scripted job statuses.
///
/// Mounting an image writes `contents[image]` to `mountpoint/test_file`
/// (or removes the file when the image has no entry), so verification runs
/// against real files.
pub struct FakeAppliance {
    pub images: Vec<Image>,
    pub mount_dir: PathBuf,
    pub test_file: String,
    pub contents: HashMap<String, String>,
    /// Status sequence every job reports; the last value repeats.
    pub job_script: Vec<i64>,
    /// Body returned by unmount calls.
    pub unmount_response: String,
    /// When false, mounts are not listed by `mounted_images`.
    pub list_mounts: bool,
    pub calls: RefCell<Vec<String>>,
    pub mount_requests: RefCell<Vec<MountRequest>>,
    pub unmount_requests: RefCell<Vec<(String, UnmountRequest)>>,
    mounted: RefCell<Vec<MountedImage>>,
    polls: RefCell<HashMap<String, usize>>,
    next_id: RefCell<u32>,
}

impl FakeAppliance {
    pub fn new(images: Vec<Image>, mount_dir: &Path) -> Self {
        Self {
            images,
            mount_dir: mount_dir.to_path_buf(),
            test_file: "Test 1.txt".to_string(),
            contents: HashMap::new(),
            job_script: vec![100],
            unmount_response: "ok".to_string(),
            list_mounts: true,
            calls: RefCell::new(Vec::new()),
            mount_requests: RefCell::new(Vec::new()),
            unmount_requests: RefCell::new(Vec::new()),
            mounted: RefCell::new(Vec::new()),
            polls: RefCell::new(HashMap::new()),
            next_id: RefCell::new(0),
        }
    }

    /// Content exposed when `image` is mounted.
    pub fn with_content(mut self, image: &str, content: &str) -> Self {
        self.contents.insert(image.to_string(), content.to_string());
        self
    }

    pub fn with_job_script(mut self, script: Vec<i64>) -> Self {
        self.job_script = script;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn mounted_count(&self) -> usize {
        self.mounted.borrow().len()
    }
}

impl Appliance for FakeAppliance {
    fn list_images(&self) -> Result<Vec<Image>, ApplianceError> {
        self.calls.borrow_mut().push("list_images".to_string());
        Ok(self.images.clone())
    }

    fn mount_image(&self, request: &MountRequest) -> Result<String, ApplianceError> {
        self.calls.borrow_mut().push(format!("mount:{}", request.img));
        self.mount_requests.borrow_mut().push(request.clone());

        let mut next_id = self.next_id.borrow_mut();
        *next_id += 1;
        let id = *next_id;

        let drive = self
            .images
            .iter()
            .find(|i| i.filename == request.img)
            .map(|i| i.drive_letter.clone())
            .unwrap_or_default();
        if self.list_mounts {
            self.mounted.borrow_mut().push(MountedImage {
                vol_num: id.to_string(),
                snap_drive: drive,
                img: Some(request.img.clone()),
                mountpoint: Some(request.mountpoint.clone()),
                read_only: Some(request.read_only),
                encrypted: Some(request.password.is_some()),
            });
        }

        let file = self.mount_dir.join(&self.test_file);
        match self.contents.get(&request.img) {
            Some(content) => fs::write(&file, content).unwrap(),
            None => {
                let _ = fs::remove_file(&file);
            }
        }

        Ok(format!("\"job-{id}\"\n"))
    }

    fn job(&self, job_id: &str) -> Result<Job, ApplianceError> {
        self.calls.borrow_mut().push(format!("job:{job_id}"));
        let mut polls = self.polls.borrow_mut();
        let index = polls.entry(job_id.to_string()).or_insert(0);
        let status = self
            .job_script
            .get(*index)
            .or_else(|| self.job_script.last())
            .copied()
            .unwrap_or(100);
        *index += 1;
        Ok(Job::new(job_id, status))
    }

    fn mounted_images(&self) -> Result<Vec<MountedImage>, ApplianceError> {
        self.calls.borrow_mut().push("mounted_images".to_string());
        Ok(self.mounted.borrow().clone())
    }

    fn unmount_image(
        &self,
        vol_num: &str,
        request: &UnmountRequest,
    ) -> Result<String, ApplianceError> {
        self.calls.borrow_mut().push(format!("unmount:{vol_num}"));
        self.unmount_requests
            .borrow_mut()
            .push((vol_num.to_string(), *request));
        self.mounted.borrow_mut().retain(|m| m.vol_num != vol_num);
        let _ = fs::remove_file(self.mount_dir.join(&self.test_file));
        Ok(self.unmount_response.clone())
    }
}

// =============================================================================
// HTTP mock server
// =============================================================================

/// A request as seen by the mock server.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    pub authorization: Option<String>,
    pub body: String,
}

/// Handler deciding `(status, body)` for each request.
pub type Handler = Box<dyn Fn(&RecordedRequest) -> (u16, String) + Send>;

/// tiny_http server standing in for the appliance.
pub struct MockServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl MockServer {
    pub fn start(handler: Handler) -> Self {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let recorded = Arc::clone(&requests);
        let stopped = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            while !stopped.load(Ordering::SeqCst) {
                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(request)) => request,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                let authorization = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("Authorization"))
                    .map(|h| h.value.as_str().to_string());
                let seen = RecordedRequest {
                    method: request.method().to_string(),
                    url: request.url().to_string(),
                    authorization,
                    body,
                };

                let (status, reply) = handler(&seen);
                recorded.lock().unwrap().push(seen);
                let _ = request.respond(Response::from_string(reply).with_status_code(status));
            }
        });

        Self {
            base_url: format!("http://{addr}/spx"),
            requests,
            stop,
            handle: Some(handle),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Handler for a healthy appliance with one image per listed drive.
///
/// Every drive in `drives` gets image `{drive}-image.spf`; mounts return
/// job `7`, which is immediately complete; the mounted-volume list contains
/// all drives with `vol_num` equal to their index.
pub fn healthy_appliance(drives: &'static [&'static str]) -> Handler {
    Box::new(move |req: &RecordedRequest| {
        match (req.method.as_str(), req.url.as_str()) {
            ("POST", "/spx/auth/login") => (200, r#"{"token":"t0k3n"}"#.to_string()),
            ("GET", "/spx/v1/image") => {
                let images: Vec<String> = drives
                    .iter()
                    .enumerate()
                    .map(|(i, d)| {
                        format!(
                            r#"{{"uuid":"uuid-{i}","drive_letter":"{d}","filename":"{d}-image.spf","snapshot_time":{}}}"#,
                            1_700_000_000 + i
                        )
                    })
                    .collect();
                (200, format!("[{}]", images.join(",")))
            }
            ("POST", "/spx/v1/mounted_image") => (200, "\"7\"".to_string()),
            ("GET", "/spx/v1/chore/7") => (200, r#"{"status":100}"#.to_string()),
            ("GET", "/spx/v1/mounted_image") => {
                let mounted: Vec<String> = drives
                    .iter()
                    .enumerate()
                    .map(|(i, d)| format!(r#"{{"vol_num":{i},"snap_drive":"{d}"}}"#))
                    .collect();
                (200, format!("[{}]", mounted.join(",")))
            }
            ("DELETE", url) if url.starts_with("/spx/v1/mounted_image/") => {
                (200, "unmounted".to_string())
            }
            _ => (404, "not found".to_string()),
        }
    })
}
