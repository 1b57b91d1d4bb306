pub fn default_project() -> String {
    "app".to_string()
}

pub fn default_delete_output_path() -> bool {
    true // a fresh output directory unless asked otherwise
}

pub fn default_debounce_ms() -> u64 {
    250
}

pub fn default_watch_ignore() -> Vec<String> {
    vec!["node_modules".to_string(), ".git".to_string()]
}

pub fn default_cache() -> bool {
    true
}
