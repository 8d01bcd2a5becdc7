//! The application's fixed table of resource clients.
//!
//! # Design
//! `Registry` is the explicitly constructed context the UI composition root
//! owns: one `TokenManager` and one `ResourceClient` per backend resource,
//! all sharing that manager. Building it is the only way to obtain the
//! clients, and there is no registration after construction.

use std::rc::Rc;

use tracing::info;

use crate::auth::TokenManager;
use crate::client::ResourceClient;
use crate::config::Config;
use crate::error::ApiError;
use crate::http::{HttpResponse, Transport, UreqTransport};
use crate::options::{ClientOptions, RequestConfig};
use crate::resources::{Identification, IdentificationSrc, MergedImage, MergedImageSrc};
use crate::storage::{FileStorage, Storage};
use crate::types::Page;

pub const MERGE_ACTION: &str = "merge";
pub const TRAVELLED_ACTION: &str = "travelled";
pub const CHANGE_NATION_ACTION: &str = "change-nation";
pub const USER_ASSESS_ACTION: &str = "user-assess";

pub struct Registry {
    pub auth: Rc<TokenManager>,
    /// `{api_url}merged-images/`
    pub merged_images: ResourceClient<MergedImageSrc, MergedImage>,
    /// `{api_url}images/`
    pub identifications: ResourceClient<IdentificationSrc, Identification>,
    media_url: String,
}

impl Registry {
    pub fn new(
        config: &Config,
        storage: Rc<dyn Storage>,
        transport: Rc<dyn Transport>,
    ) -> Result<Self, ApiError> {
        let auth = Rc::new(TokenManager::new(
            config.auth_settings(),
            storage,
            Rc::clone(&transport),
        )?);

        let request = match config.timeout {
            Some(timeout) => RequestConfig::new().timeout(timeout),
            None => RequestConfig::new(),
        };

        let media_url = config.media_url.clone();
        let merged_images = ResourceClient::new(
            ClientOptions::new()
                .endpoint(format!("{}merged-images/", config.api_url))
                .auth(Rc::clone(&auth))
                .placeholder(MergedImageSrc::placeholder())
                .list_placeholder_count(config.list_placeholder_count)
                .request(request.clone())
                .manual_actions([MERGE_ACTION])
                .parse(move |src: &MergedImageSrc, _: &str| Ok(MergedImage::parse(src, &media_url))),
            Rc::clone(&transport),
        );

        let identifications = ResourceClient::new(
            ClientOptions::new()
                .endpoint(format!("{}images/", config.api_url))
                .auth(Rc::clone(&auth))
                .placeholder(IdentificationSrc::placeholder())
                .list_placeholder_count(config.list_placeholder_count)
                .request(request)
                .parse(|src: &IdentificationSrc, _: &str| Ok(Identification::parse(src))),
            transport,
        );

        info!(api_url = %config.api_url, logged_in = auth.is_logged_in(), "registry ready");
        Ok(Registry {
            auth,
            merged_images,
            identifications,
            media_url: config.media_url.clone(),
        })
    }

    /// File-backed storage and the blocking ureq transport.
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let storage = Rc::new(FileStorage::new(&config.storage_path));
        let transport = Rc::new(UreqTransport::new(config.timeout));
        Registry::new(config, storage, transport)
    }

    /// Record the user's correction of an identification's nation.
    pub fn change_nation(&self, id: i64, name: &str) -> Result<Identification, ApiError> {
        let options = ClientOptions::new().query("name", name);
        self.identifications
            .action(CHANGE_NATION_ACTION, Some(id.into()), Some(&options))
    }

    /// Record the user's satisfaction with an identification.
    pub fn user_assess(&self, id: i64, assess: &str) -> Result<Identification, ApiError> {
        let options = ClientOptions::new().query("assess", assess);
        self.identifications
            .action(USER_ASSESS_ACTION, Some(id.into()), Some(&options))
    }

    /// Ask the server to compose a merged image. `merge` is a manual action,
    /// so a failure is returned instead of a placeholder.
    pub fn merge(&self, id: i64) -> Result<MergedImage, ApiError> {
        let media_url = self.media_url.clone();
        let options = ClientOptions::new()
            .then(|response: &HttpResponse, _: &str| {
                serde_json::from_str(&response.body)
                    .map_err(|e| ApiError::DeserializationError(e.to_string()))
            })
            .error(|e: &ApiError, _: &str| Err(e.clone()))
            .parse(move |src: &MergedImageSrc, _: &str| Ok(MergedImage::parse(src, &media_url)));
        self.merged_images
            .action(MERGE_ACTION, Some(id.into()), Some(&options))
    }

    /// The latest merged image per background.
    pub fn travelled(&self) -> Result<Page<MergedImage>, ApiError> {
        self.merged_images.list_action(TRAVELLED_ACTION, None)
    }
}
