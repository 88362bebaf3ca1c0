#[cfg(test)]
mod tests {
    use thread_runner::{errors::Error, pool::WorkerPool};
    use anyhow::Context;
    use std::{
        io,
        sync::{Arc, Mutex, OnceLock},
    };

    /// Общий буфер, в который пишет fmt-подписчик
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }

        fn lines_with(&self, needle: &str) -> Vec<String> {
            self.text().lines().filter(|l| l.contains(needle)).map(str::to_string).collect()
        }
    }

    // Воркеры пула живут в своих потоках, поэтому подписчик глобальный
    fn captured() -> &'static Captured {
        static CAPTURED: OnceLock<Captured> = OnceLock::new();
        CAPTURED.get_or_init(|| {
            let captured = Captured::default();
            let writer = captured.clone();
            tracing_subscriber::fmt()
                .with_ansi(false)
                .with_max_level(tracing::Level::DEBUG)
                .with_writer(move || writer.clone())
                .init();
            captured
        })
    }

    #[test]
    fn test_failure_severity_mapping() {
        println!("\n=== TEST: Уровень логирования ошибок джобов ===");
        let logs = captured();
        let pool = WorkerPool::new(2).unwrap();

        let domain = pool
            .submit(|| -> anyhow::Result<()> {
                Err(Error::InvalidRange("invalid range: \"7..x\"".into()).into())
            })
            .unwrap();
        let unexpected = pool
            .submit(|| -> anyhow::Result<()> {
                Err(anyhow::anyhow!("socket reset")).context("fetching node state")
            })
            .unwrap();
        let panicked = pool
            .submit(|| -> anyhow::Result<()> { panic!("mapping boom") })
            .unwrap();

        assert!(domain.wait().is_err());
        assert!(unexpected.wait().is_err());
        assert!(panicked.wait().is_err());
        pool.wait_all();

        let lines = logs.lines_with("7..x");
        assert_eq!(lines.len(), 1, "{:?}", lines);
        assert!(lines[0].contains("ERROR"), "{}", lines[0]);
        assert!(lines[0].contains("fatal=true"), "{}", lines[0]);
        assert!(lines[0].contains("InvalidRange"), "{}", lines[0]);

        // Непредвиденная ошибка: полная цепочка причин через Debug, многострочно
        let lines = logs.lines_with("fetching node state");
        assert_eq!(lines.len(), 1, "{:?}", lines);
        assert!(lines[0].contains("ERROR"), "{}", lines[0]);
        assert!(!lines[0].contains("fatal"), "{}", lines[0]);
        assert!(
            logs.text().contains("fetching node state\n\nCaused by:\n    socket reset"),
            "{}",
            logs.text()
        );

        let lines = logs.lines_with("mapping boom");
        assert!(lines.iter().any(|l| l.contains("task panicked")), "{:?}", lines);
        assert!(lines.iter().all(|l| !l.contains("fatal")), "{:?}", lines);
    }
}
