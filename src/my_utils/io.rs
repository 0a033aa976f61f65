use std::path::PathBuf;


/// 路径直接按linux下的写法，自动判断系统类型给出兼容格式
pub fn compatible_path_format(path: &str) -> String{
    let mut full_path = PathBuf::new();
    let parts:Vec<&str> = path.split('/').collect();
    for (i, part) in parts.iter().enumerate(){
        // 绝对路径开头的空段要保留根目录
        if i == 0 && part.is_empty(){
            full_path.push(std::path::MAIN_SEPARATOR.to_string());
            continue;
        }
        full_path.push(part);
    }
    full_path.to_string_lossy().into_owned()
}

/// 读取二进制文件，用于加载字体
pub fn read_bytes(path: &str) -> std::io::Result<Vec<u8>> {
    std::fs::read(compatible_path_format(path))
}
