//! Command validation for provider configs, per the external-interfaces
//! command-whitelist contract.

const COMMAND_WHITELIST: &[&str] = &["node", "python", "python3", "npx", "uv", "pipx", "deno", "bun"];
const SHELL_METACHARACTERS: &[char] = &[';', '&', '|', '`', '$', '(', ')', '{', '}', '[', ']'];

/// Reject a `command` vector that is empty, whose executable isn't
/// whitelisted, or whose arguments contain shell metacharacters, `..`,
/// `/dev/` paths, an `rm -...` invocation, or `sudo`.
#[must_use]
pub fn validate_command(command: &[String]) -> Result<(), String> {
    let Some(executable) = command.first() else {
        return Err("command must have at least one element".to_string());
    };
    if !COMMAND_WHITELIST.contains(&executable.as_str()) {
        return Err(format!("executable '{executable}' is not in the allowed list"));
    }
    for element in command {
        if let Some(reason) = forbidden_reason(element) {
            return Err(format!("argument '{element}' is rejected: {reason}"));
        }
    }
    Ok(())
}

fn forbidden_reason(element: &str) -> Option<&'static str> {
    if element.contains(SHELL_METACHARACTERS) {
        return Some("contains a shell metacharacter");
    }
    if element.contains("..") {
        return Some("contains '..'");
    }
    if element.starts_with("/dev/") {
        return Some("references /dev/");
    }
    if is_rm_dash(element) {
        return Some("looks like 'rm -...'");
    }
    if element.contains("sudo") {
        return Some("references sudo");
    }
    None
}

/// `rm\s+-` — an `rm` invocation followed by whitespace and a `-` flag,
/// matched anywhere in the element.
fn is_rm_dash(element: &str) -> bool {
    let bytes = element.as_bytes();
    let mut i = 0;
    while let Some(pos) = element[i..].find("rm") {
        let start = i + pos;
        let mut j = start + 2;
        let mut saw_space = false;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            saw_space = true;
            j += 1;
        }
        if saw_space && bytes.get(j) == Some(&b'-') {
            return true;
        }
        i = start + 2;
        if i >= element.len() {
            break;
        }
    }
    false
}

/// Strip shell metacharacters and `..` from an argument before it is handed
/// to the spawner, independent of the reject check above (defense in depth
/// for arguments that pass validation but still embed stray characters).
#[must_use]
pub fn sanitize_argument(arg: &str) -> String {
    let without_metachars: String = arg.chars().filter(|c| !SHELL_METACHARACTERS.contains(c)).collect();
    without_metachars.replace("..", "")
}
