use parley::{History, ReplyVerbose, TopicSummary, TriggerSummary, UNDEFINED};
use std::collections::BTreeMap;

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            self.wrap(s.as_ref(), color)
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            self.wrap(s.as_ref(), BOLD)
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            self.wrap(s.as_ref(), DIM)
        }

        fn wrap(&self, s: &str, code: &str) -> String {
            if self.enabled { format!("{code}{s}{RESET}") } else { s.to_string() }
        }
    }
}

const CATEGORIES: [&str; 4] = ["literal", "wildcard", "optional", "catch-all"];

fn section(palette: &ansi::Palette, title: &str) {
    println!("\n{}", palette.paint(format!("━━━ {title} ━━━"), ansi::GRAY));
}

pub fn print_reply(out: &ReplyVerbose, color: bool) {
    let palette = ansi::Palette::new(color);
    let details = &out.details;
    println!("\n{}", palette.bold(palette.paint(format!("⚙  Message: \"{}\"", out.message), ansi::CYAN)));

    section(&palette, "Match");
    match &details.matched {
        Some(m) => {
            println!(
                "  {} {}  {} {}",
                palette.dim("trigger:"),
                palette.bold(palette.paint(&m.pattern, ansi::GREEN)),
                palette.dim("│ topic:"),
                palette.paint(&m.topic, ansi::BLUE),
            );
            if !m.stars.is_empty() {
                println!("  {} {}", palette.dim("stars:"), palette.paint(format!("{:?}", m.stars), ansi::YELLOW));
            }
            if m.used_previous {
                println!("  {} {}", palette.dim("previous:"), palette.paint(format!("{:?}", m.botstars), ansi::YELLOW));
            }
        }
        None => println!("{}", palette.dim("  No trigger matched")),
    }

    let steps = &details.metrics.steps;
    if steps.len() > 1 {
        section(&palette, "Redirects");
        for step in steps.iter().skip(1) {
            println!(
                "  {} {} {} {}",
                palette.paint(format!("[{}]", step.depth), ansi::GRAY),
                palette.paint(&step.input, ansi::CYAN),
                palette.dim("→"),
                match &step.matched {
                    Some(pattern) => palette.paint(pattern, ansi::GREEN),
                    None => palette.dim("no match"),
                },
            );
        }
    }

    if !details.diagnostics.is_empty() || details.aborted {
        section(&palette, "Diagnostics");
        for diagnostic in &details.diagnostics {
            println!("  {} {}", palette.paint("•", ansi::YELLOW), diagnostic);
        }
        if details.aborted {
            println!("  {}", palette.paint("turn aborted", ansi::YELLOW));
        }
    }

    section(&palette, "Timing");
    println!(
        "  Total: {}  │  Matching: {}  │  Render: {}  │  Tried: {}  │  Topic now: {}",
        palette.paint(format!("{:?}", details.metrics.total), ansi::GREEN),
        palette.paint(format!("{:?}", details.metrics.matching), ansi::CYAN),
        palette.dim(format!("{:?}", details.metrics.render)),
        palette.paint(details.metrics.triggers_tried.to_string(), ansi::YELLOW),
        palette.paint(&details.topic, ansi::BLUE),
    );
    println!();
}

pub fn print_topics(topics: &[TopicSummary], color: bool) {
    let palette = ansi::Palette::new(color);
    section(&palette, "Topics");
    for topic in topics {
        let mut line = format!("  {}", palette.bold(palette.paint(&topic.name, ansi::BLUE)));
        if !topic.includes.is_empty() {
            line.push_str(&format!(" {} {}", palette.dim("includes"), topic.includes.join(" ")));
        }
        if !topic.inherits.is_empty() {
            line.push_str(&format!(" {} {}", palette.dim("inherits"), topic.inherits.join(" ")));
        }
        println!("{line}");

        for trigger in &topic.triggers {
            println!("    {} {}", palette.paint("+", ansi::GRAY), fmt_trigger(trigger, &palette));
        }
        if topic.triggers.is_empty() {
            println!("    {}", palette.dim("(no triggers of its own)"));
        }
    }
    println!();
}

pub fn print_sorted(topic: &str, triggers: &[TriggerSummary], color: bool) {
    let palette = ansi::Palette::new(color);
    section(&palette, &format!("Sorted: {topic}"));
    for (idx, trigger) in triggers.iter().enumerate() {
        let from = if trigger.topic == topic { String::new() } else { palette.dim(format!(" (from {})", trigger.topic)) };
        println!("  {} {}{}", palette.paint(format!("[{idx}]"), ansi::GRAY), fmt_trigger(trigger, &palette), from);
    }
    println!();
}

pub fn print_vars(user: &str, vars: BTreeMap<String, String>, color: bool) {
    let palette = ansi::Palette::new(color);
    section(&palette, &format!("Variables: {user}"));
    if vars.is_empty() {
        println!("{}", palette.dim("  none"));
    }
    for (name, value) in vars {
        println!("  {} = {}", palette.paint(name, ansi::CYAN), value);
    }
    println!();
}

pub fn print_history(inputs: &History, replies: &History, color: bool) {
    let palette = ansi::Palette::new(color);
    section(&palette, "History");
    let turns = inputs.iter().zip(replies.iter()).enumerate().filter(|(_, (input, _))| *input != UNDEFINED);
    for (idx, (input, reply)) in turns {
        println!("  {} {} {}", palette.paint(format!("[{}]", idx + 1), ansi::GRAY), palette.paint(input, ansi::CYAN), palette.dim("→"));
        println!("      {}", reply);
    }
    println!();
}

fn fmt_trigger(trigger: &TriggerSummary, palette: &ansi::Palette) -> String {
    let mut out = palette.paint(&trigger.pattern, ansi::GREEN);
    if let Some(previous) = &trigger.previous {
        out.push_str(&format!(" {} {}", palette.dim("%"), palette.paint(previous, ansi::YELLOW)));
    }
    let category = CATEGORIES.get(usize::from(trigger.category)).copied().unwrap_or("?");
    out.push_str(&format!(" {}", palette.dim(format!("│ {category}"))));
    if trigger.weight > 0 {
        out.push_str(&palette.dim(format!(" w={}", trigger.weight)));
    }
    if let Some(redirect) = &trigger.redirect {
        out.push_str(&format!(" {} {}", palette.dim("@"), palette.paint(redirect, ansi::CYAN)));
    } else {
        let bodies = trigger.replies.len() + trigger.conditions.len();
        out.push_str(&palette.dim(format!(" {bodies} repl{}", if bodies == 1 { "y" } else { "ies" })));
    }
    out
}
