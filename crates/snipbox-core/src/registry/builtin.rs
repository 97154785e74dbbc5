// Built-in execution profiles for python, javascript and bash.

use super::profile::{IsolatedEnvironment, ProfileDefinition, ENTRY_PLACEHOLDER};
use std::collections::BTreeMap;

const PYTHON_IMPORT_PATTERN: &str = r"(?m)^\s*(?:import|from)\s+([a-zA-Z0-9_]+)";

const JAVASCRIPT_IMPORT_PATTERN: &str = r#"(?m)require\(\s*['"]([^'"]+)['"]\s*\)|\s*from\s*['"]([^'"]+)['"]|^\s*import\s*['"]([^'"]+)['"]"#;

const PYTHON_STDLIB: &[&str] = &[
    "abc", "argparse", "array", "ast", "asyncio", "base64", "binascii", "bisect",
    "builtins", "calendar", "cmath", "collections", "concurrent", "contextlib",
    "copy", "csv", "ctypes", "dataclasses", "datetime", "decimal", "difflib",
    "enum", "errno", "fractions", "functools", "gc", "getpass", "glob", "gzip",
    "hashlib", "heapq", "hmac", "html", "http", "importlib", "inspect", "io",
    "ipaddress", "itertools", "json", "logging", "math", "multiprocessing",
    "operator", "os", "pathlib", "pickle", "platform", "pprint", "queue",
    "random", "re", "secrets", "shutil", "signal", "socket", "sqlite3",
    "statistics", "string", "struct", "subprocess", "sys", "tempfile",
    "textwrap", "threading", "time", "timeit", "tkinter", "traceback",
    "types", "typing", "unittest", "urllib", "uuid", "warnings", "weakref",
    "xml", "zipfile", "zlib", "__future__",
];

const NODE_BUILTINS: &[&str] = &[
    "assert", "async_hooks", "buffer", "child_process", "cluster", "console",
    "crypto", "dgram", "dns", "events", "fs", "fs/promises", "http", "http2",
    "https", "module", "net", "os", "path", "perf_hooks", "process",
    "querystring", "readline", "stream", "string_decoder", "timers", "tls",
    "tty", "url", "util", "v8", "vm", "worker_threads", "zlib",
];

// Import names whose PyPI distribution is named differently.
const PYTHON_PACKAGE_ALIASES: &[(&str, &str)] = &[
    ("PIL", "pillow"),
    ("bs4", "beautifulsoup4"),
    ("cv2", "opencv-python"),
    ("dateutil", "python-dateutil"),
    ("sklearn", "scikit-learn"),
    ("yaml", "pyyaml"),
];

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub(crate) fn python() -> ProfileDefinition {
    ProfileDefinition {
        language: "python".to_string(),
        image: "python:3.11".to_string(),
        entry_filename: "code_to_run.py".to_string(),
        run_command: strings(&["/app/venv/bin/python", ENTRY_PLACEHOLDER]),
        install_command: Some(strings(&["/app/venv/bin/pip", "install", "-q"])),
        dependency_pattern: Some(PYTHON_IMPORT_PATTERN.to_string()),
        standard_library: strings(PYTHON_STDLIB),
        environment: Some(IsolatedEnvironment {
            create: strings(&["python", "-m", "venv", "venv"]),
            teardown: strings(&["rm", "-rf", "/app/venv"]),
        }),
        cache_path: Some("/root/.cache/pip".to_string()),
        package_aliases: PYTHON_PACKAGE_ALIASES
            .iter()
            .map(|(module, package)| (module.to_string(), package.to_string()))
            .collect::<BTreeMap<_, _>>(),
    }
}

pub(crate) fn javascript() -> ProfileDefinition {
    ProfileDefinition {
        language: "javascript".to_string(),
        image: "node:20".to_string(),
        entry_filename: "code_to_run.js".to_string(),
        run_command: strings(&["node", ENTRY_PLACEHOLDER]),
        install_command: Some(strings(&["npm", "install", "--no-audit", "--no-fund"])),
        dependency_pattern: Some(JAVASCRIPT_IMPORT_PATTERN.to_string()),
        // Builtins may also be imported as `node:<name>`.
        standard_library: NODE_BUILTINS
            .iter()
            .flat_map(|name| [name.to_string(), format!("node:{}", name)])
            .collect(),
        environment: None,
        cache_path: Some("/root/.npm".to_string()),
        package_aliases: BTreeMap::new(),
    }
}

pub(crate) fn bash() -> ProfileDefinition {
    ProfileDefinition {
        language: "bash".to_string(),
        image: "bash".to_string(),
        entry_filename: "code_to_run.sh".to_string(),
        run_command: strings(&["bash", ENTRY_PLACEHOLDER]),
        install_command: None,
        dependency_pattern: None,
        standard_library: Vec::new(),
        environment: None,
        cache_path: None,
        package_aliases: BTreeMap::new(),
    }
}

pub(crate) fn definitions() -> Vec<ProfileDefinition> {
    vec![python(), javascript(), bash()]
}
