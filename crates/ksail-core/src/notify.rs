//! 進捗通知
//!
//! ユーザー向けのメッセージ出力のみを担う。通知先がなくてもオーケストレーションの
//! 挙動は変わらない。

use colored::Colorize;

/// 進捗メッセージの出力先
pub trait Notifier: Send + Sync {
    fn title(&self, message: &str);
    fn activity(&self, message: &str);
    fn success(&self, message: &str);
    fn warning(&self, message: &str);
    fn error(&self, message: &str);
}

/// 何も出力しない通知先
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn title(&self, _message: &str) {}
    fn activity(&self, _message: &str) {}
    fn success(&self, _message: &str) {}
    fn warning(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// 端末に色付きで出力する通知先
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn title(&self, message: &str) {
        println!();
        println!("{}", message.blue().bold());
    }

    fn activity(&self, message: &str) {
        println!("  → {}", message);
    }

    fn success(&self, message: &str) {
        println!("  {} {}", "✓".green(), message);
    }

    fn warning(&self, message: &str) {
        eprintln!("  {} {}", "⚠".yellow(), message);
    }

    fn error(&self, message: &str) {
        eprintln!("  {} {}", "✗".red().bold(), message);
    }
}
