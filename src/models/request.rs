/*
    前端请求结构
*/

use serde::{Serialize, Deserialize};


#[derive(Debug, Serialize, Deserialize)]
pub struct ImageRequest {
    /// base64图片，可以带 data:image/...;base64, 前缀
    pub image: String,
}
