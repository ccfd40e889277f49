use anise_reader::{ReaderError, Value};

pub fn read_one(src: &str) -> Value {
    anise_reader::read_string(src)
        .unwrap_or_else(|err| panic!("failed to read {:?}: {}", src, err))
}

pub fn read_err(src: &str) -> ReaderError {
    match anise_reader::read_string(src) {
        Ok(value) => panic!("expected error for {:?}, got {}", src, value),
        Err(err) => err,
    }
}
