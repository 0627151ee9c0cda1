use std::path::PathBuf;

pub fn get_work_space() -> anyhow::Result<PathBuf> {
    std::env::current_dir().map_err(|e| anyhow!("get current dir error. {}", e))
}

pub fn parse_arg_with(arg_key: &str, default_value: &str) -> String {
    parse_arg(arg_key).unwrap_or(default_value.to_string())
}

/// find a `key=value` command line argument
pub fn parse_arg(arg_key: &str) -> anyhow::Result<String> {
    let args: Vec<String> = std::env::args().collect();
    parse_arg_from(args.as_slice(), arg_key)
}

pub fn parse_arg_from(args: &[String], arg_key: &str) -> anyhow::Result<String> {
    for arg in args {
        if let Some((key, value)) = arg.split_once('=') {
            if key.eq(arg_key) {
                return Ok(value.to_string());
            }
        }
    }

    Err(anyhow!("`{}` argument is not found", arg_key))
}

#[cfg(test)]
mod tests {
    use crate::utils::process::parse_arg_from;

    #[test]
    pub fn parse_arg_test() {
        let args = vec![
            "remote-list".to_string(),
            "port=6702".to_string(),
            "cluster_config=/tmp/a=b.yaml".to_string(),
        ];
        assert_eq!(parse_arg_from(&args, "port").unwrap(), "6702");
        assert_eq!(
            parse_arg_from(&args, "cluster_config").unwrap(),
            "/tmp/a=b.yaml"
        );
        assert!(parse_arg_from(&args, "item_count").is_err());
    }
}
