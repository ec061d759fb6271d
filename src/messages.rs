//! The fixed, client-visible wire strings (spec.md §4.2, §7). Every byte of
//! these bodies is part of the protocol contract, so they live in one place
//! rather than being assembled ad hoc at each call site.

pub fn reserved_path(path: &str) -> String {
    format!("[ERROR] Cannot send to a reserved path '{path}'. (e.g. '/mypath123')\n")
}

pub fn bad_count(n: i64) -> String {
    format!("[ERROR] n should > 0, but n = {n}.\n")
}

pub fn already_established_sender(path: &str) -> String {
    format!("[ERROR] Connection on '{path}' has been established already.\n")
}

pub fn already_established_receiver(path: &str) -> String {
    format!("Error: Connection on '{path}' has been established already.\n")
}

pub fn count_mismatch(expected: usize, got: i64) -> String {
    format!("Error: The number of receivers should be {expected} but {got}.\n")
}

pub fn duplicate_sender(path: &str) -> String {
    format!("[ERROR] Another sender has been registered on '{path}'.\n")
}

pub fn receivers_full() -> String {
    "Error: The number of receivers has reached limits.\n".to_owned()
}

pub fn unsupported_method(method: &str) -> String {
    format!("Error: Unsupported method: {method}\n")
}

pub fn waiting_for_receivers(n: usize) -> String {
    format!("[INFO] Waiting for {n} receiver(s)...\n")
}

pub fn receivers_connected(k: usize) -> String {
    format!("[INFO] {k} receiver(s) has/have been connected.\n")
}

pub fn receiver_connected() -> String {
    "[INFO] A receiver was connected.\n".to_owned()
}

pub fn start_sending() -> String {
    "Start sending!\n".to_owned()
}

pub fn start_sending_with(n: usize) -> String {
    format!("[INFO] Start sending with {n} receiver(s)!\n")
}

pub fn sending_successful() -> String {
    "[INFO] Sending Successful!\n".to_owned()
}

pub fn sending_failed() -> String {
    "[ERROR] Sending Failed.\n".to_owned()
}

pub fn all_receivers_closed() -> String {
    "[INFO] All receiver(s) was/were closed halfway.\n".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_strings_match_the_contract_byte_for_byte() {
        assert_eq!(
            reserved_path("/version"),
            "[ERROR] Cannot send to a reserved path '/version'. (e.g. '/mypath123')\n"
        );
        assert_eq!(bad_count(-1), "[ERROR] n should > 0, but n = -1.\n");
        assert_eq!(
            count_mismatch(2, 3),
            "Error: The number of receivers should be 2 but 3.\n"
        );
        assert_eq!(
            start_sending_with(1),
            "[INFO] Start sending with 1 receiver(s)!\n"
        );
    }
}
