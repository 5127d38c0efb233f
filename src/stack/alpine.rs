//! Alpine (apk / busybox) rendering of run steps

use crate::image::RunStep;

/// Package manager caches and metadata removed after runtime installs
pub fn cleanup_paths() -> Vec<String> {
    vec![
        "/var/cache/apk/*".to_string(),
        "/lib/apk/db".to_string(),
        "/root/.cache".to_string(),
    ]
}

/// Shell text for a single run step
pub fn render_step(step: &RunStep) -> String {
    match step {
        RunStep::Install { packages, update } => {
            let update_flag = if *update { "--update " } else { "" };
            format!("apk {}--no-cache add {}", update_flag, packages.join(" "))
        }
        RunStep::AddGroup { name, system } => {
            if *system {
                format!("addgroup -S {}", name)
            } else {
                format!("addgroup {}", name)
            }
        }
        RunStep::AddUser {
            name,
            group,
            home,
            shell,
            label,
            system,
        } => {
            let system_flag = if *system { " -S" } else { "" };
            format!(
                "adduser{} -G {} -h {} -s {} -g {} -D {}",
                system_flag,
                group,
                home,
                shell,
                quote(label),
                name
            )
        }
        RunStep::Remove { paths } => format!("rm -rf {}", paths.join(" ")),
        RunStep::MakeDirs { paths } => format!("mkdir -p {}", quote_all(paths)),
        RunStep::Chown {
            user,
            group,
            paths,
            recursive,
        } => {
            let flag = if *recursive { "-R " } else { "" };
            format!("chown {}{}:{} {}", flag, user, group, quote_all(paths))
        }
        RunStep::Shell { command } => command.clone(),
    }
}

/// Double-quote a word, leaving `$VAR` expansion intact
pub fn quote(word: &str) -> String {
    format!("\"{}\"", word.replace('\\', "\\\\").replace('"', "\\\""))
}

fn quote_all(words: &[String]) -> String {
    words
        .iter()
        .map(|w| quote(w))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_with_update() {
        let step = RunStep::Install {
            packages: vec!["python3".to_string(), "musl".to_string()],
            update: true,
        };
        assert_eq!(render_step(&step), "apk --update --no-cache add python3 musl");
    }

    #[test]
    fn test_install_without_update() {
        let step = RunStep::Install {
            packages: vec!["gcc".to_string()],
            update: false,
        };
        assert_eq!(render_step(&step), "apk --no-cache add gcc");
    }

    #[test]
    fn test_add_user_disables_login() {
        let step = RunStep::AddUser {
            name: "spiderfoot".to_string(),
            group: "spiderfoot".to_string(),
            home: "/home/spiderfoot".to_string(),
            shell: "/sbin/nologin".to_string(),
            label: "SpiderFoot User".to_string(),
            system: false,
        };
        assert_eq!(
            render_step(&step),
            "adduser -G spiderfoot -h /home/spiderfoot -s /sbin/nologin -g \"SpiderFoot User\" -D spiderfoot"
        );
    }

    #[test]
    fn test_system_group() {
        let step = RunStep::AddGroup {
            name: "spiderfoot".to_string(),
            system: true,
        };
        assert_eq!(render_step(&step), "addgroup -S spiderfoot");
    }

    #[test]
    fn test_chown_keeps_variable_expansion() {
        let step = RunStep::Chown {
            user: "spiderfoot".to_string(),
            group: "spiderfoot".to_string(),
            paths: vec!["$SPIDERFOOT_DATA".to_string()],
            recursive: false,
        };
        assert_eq!(
            render_step(&step),
            "chown spiderfoot:spiderfoot \"$SPIDERFOOT_DATA\""
        );
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("a \"b\""), "\"a \\\"b\\\"\"");
    }

    #[test]
    fn test_cleanup_paths_cover_apk() {
        let paths = cleanup_paths();
        assert!(paths.iter().any(|p| p.starts_with("/var/cache/apk")));
        assert!(paths.contains(&"/lib/apk/db".to_string()));
    }
}
