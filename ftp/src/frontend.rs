use std::io;

pub trait Frontend {
    fn prompt_line(&mut self, label: &str) -> io::Result<String>;
    fn display(&mut self, text: &str);
    fn read_local_file(&mut self, path: &str) -> io::Result<Vec<u8>>;
    fn write_local_file(&mut self, path: &str, data: &[u8]) -> io::Result<()>;
}

pub trait LogSink {
    fn log_line(&mut self, line: &str);
}

#[derive(Default)]
pub struct LogFacade {}

impl LogSink for LogFacade {
    fn log_line(&mut self, line: &str) {
        log::info!(target: "transcript", "{}", line);
    }
}
