use std::fs;
use std::io::{self, BufRead, ErrorKind, Write};

use ftp::Frontend;

/// Standard input and output plus the local file system.
pub struct Terminal {}

impl Frontend for Terminal {
    fn prompt_line(&mut self, label: &str) -> io::Result<String> {
        print!("{}", label);
        io::stdout().flush()?;
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Err(io::Error::from(ErrorKind::UnexpectedEof));
        }
        Ok(line.trim().to_owned())
    }

    fn display(&mut self, text: &str) {
        println!("{}", text);
    }

    fn read_local_file(&mut self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write_local_file(&mut self, path: &str, data: &[u8]) -> io::Result<()> {
        fs::write(path, data)
    }
}
