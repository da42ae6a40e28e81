//! Tests for the request, outcome and handle types.

#[cfg(test)]
mod tests {
    use super::super::*;

    #[test]
    fn test_request_defaults_to_fresh() {
        let req = Request::new();
        assert_eq!(req.async_status, AsyncStatus::Fresh);
        assert_eq!(req.payload_len, 0);
        assert!(!req.is_again());
    }

    #[test]
    fn test_with_var_tracks_payload_len() {
        let req = Request::new()
            .with_var("REQUEST_METHOD", "GET")
            .with_var("PATH_INFO", "/");
        // 4 bytes of length prefixes per pair
        assert_eq!(req.payload_len, (4 + 14 + 3) + (4 + 9 + 1));
        assert_eq!(req.vars.len(), 2);
    }

    #[test]
    fn test_var_lookup() {
        let req = Request::new().with_var("HTTP_HOST", "example.com");
        assert_eq!(req.var("HTTP_HOST"), Some(&b"example.com"[..]));
        assert_eq!(req.var("PATH_INFO"), None);
    }

    #[test]
    fn test_slot_ref_display() {
        assert_eq!(SlotRef::new(2, 5).to_string(), "2:5");
    }

    #[test]
    fn test_stored_ref_entry_point() {
        let handle = StoredRef {
            instance: 7,
            owner: SlotRef::new(1, 0),
            index: StoredRef::ENTRY_POINT_INDEX,
        };
        assert!(handle.is_entry_point());
        assert_eq!(handle.to_string(), "ref#0@7(slot 1:0)");
    }

    #[test]
    fn test_error_messages() {
        let err = BridgeError::UnknownSlot(SlotRef::new(3, 1));
        assert_eq!(err.to_string(), "Unknown slot 3:1");

        let err: BridgeError = HostError::InvalidLock(9).into();
        assert_eq!(err.to_string(), "Host error: Invalid lock number 9");
    }
}
