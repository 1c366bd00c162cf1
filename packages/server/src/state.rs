use std::sync::Arc;

use crate::assets::AssetService;
use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub assets: Arc<AssetService>,
    pub config: Arc<AppConfig>,
}
