//! Classification of client error codes.
//!
//! Client library errors in the `CR_*` range that mean the connection to the
//! server is gone are [`ErrorClass::ConnectionLost`]. Lock conflicts the
//! server resolved by aborting the statement are [`ErrorClass::Retryable`].
//! Everything else is [`ErrorClass::Generic`].

pub const CR_UNKNOWN_ERROR: u32 = 2000;
pub const CR_SOCKET_CREATE_ERROR: u32 = 2001;
pub const CR_CONNECTION_ERROR: u32 = 2002;
pub const CR_CONN_HOST_ERROR: u32 = 2003;
pub const CR_IPSOCK_ERROR: u32 = 2004;
pub const CR_SERVER_GONE_ERROR: u32 = 2006;
pub const CR_OUT_OF_MEMORY: u32 = 2008;
pub const CR_WRONG_HOST_INFO: u32 = 2009;
pub const CR_TCP_CONNECTION: u32 = 2011;
pub const CR_SERVER_HANDSHAKE_ERR: u32 = 2012;
pub const CR_SERVER_LOST: u32 = 2013;
pub const CR_COMMANDS_OUT_OF_SYNC: u32 = 2014;
pub const CR_SSL_CONNECTION_ERROR: u32 = 2026;
pub const CR_NO_PREPARE_STMT: u32 = 2030;
pub const CR_PARAMS_NOT_BOUND: u32 = 2031;
pub const CR_UNSUPPORTED_PARAM_TYPE: u32 = 2036;
pub const CR_CONN_UNKNOW_PROTOCOL: u32 = 2047;
pub const CR_INVALID_CONN_HANDLE: u32 = 2048;
pub const CR_SERVER_LOST_EXTENDED: u32 = 2055;
pub const CR_STMT_CLOSED: u32 = 2056;

pub const ER_TABLE_EXISTS_ERROR: u32 = 1050;
pub const ER_BAD_FIELD_ERROR: u32 = 1054;
pub const ER_DUP_FIELDNAME: u32 = 1060;
pub const ER_DUP_KEYNAME: u32 = 1061;
pub const ER_DUP_ENTRY: u32 = 1062;
pub const ER_PARSE_ERROR: u32 = 1064;
pub const ER_NO_SUCH_TABLE: u32 = 1146;
pub const ER_LOCK_WAIT_TIMEOUT: u32 = 1205;
pub const ER_LOCK_DEADLOCK: u32 = 1213;

/// Codes after which the connection must be considered dead.
pub const CONNECTION_LOST_CODES: [u32; 19] = [
    CR_SOCKET_CREATE_ERROR,
    CR_CONNECTION_ERROR,
    CR_CONN_HOST_ERROR,
    CR_IPSOCK_ERROR,
    CR_SERVER_GONE_ERROR,
    CR_OUT_OF_MEMORY,
    CR_WRONG_HOST_INFO,
    CR_TCP_CONNECTION,
    CR_SERVER_HANDSHAKE_ERR,
    CR_SERVER_LOST,
    CR_COMMANDS_OUT_OF_SYNC,
    CR_SSL_CONNECTION_ERROR,
    CR_NO_PREPARE_STMT,
    CR_PARAMS_NOT_BOUND,
    CR_UNSUPPORTED_PARAM_TYPE,
    CR_CONN_UNKNOW_PROTOCOL,
    CR_INVALID_CONN_HANDLE,
    CR_SERVER_LOST_EXTENDED,
    CR_STMT_CLOSED,
];

/// Severity class of a client error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The statement may succeed when simply run again.
    Retryable,
    /// The connection is unusable until it is re-established.
    ConnectionLost,
    /// Any other failure.
    Generic,
}

impl ErrorClass {
    pub fn is_connection_lost(self) -> bool {
        self == ErrorClass::ConnectionLost
    }
}

/// Classifies an error code; `0` means "no error" and yields `None`.
///
/// # Examples
///
/// ```
/// use rowbind_mysql::{ErrorClass, classify};
///
/// assert_eq!(classify(0), None);
/// assert_eq!(classify(2006), Some(ErrorClass::ConnectionLost));
/// assert_eq!(classify(1213), Some(ErrorClass::Retryable));
/// assert_eq!(classify(1062), Some(ErrorClass::Generic));
/// ```
pub fn classify(code: u32) -> Option<ErrorClass> {
    match code {
        0 => None,
        ER_LOCK_DEADLOCK | ER_LOCK_WAIT_TIMEOUT => Some(ErrorClass::Retryable),
        c if CONNECTION_LOST_CODES.contains(&c) => Some(ErrorClass::ConnectionLost),
        _ => Some(ErrorClass::Generic),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_listed_code_is_connection_lost() {
        for code in CONNECTION_LOST_CODES {
            assert_eq!(classify(code), Some(ErrorClass::ConnectionLost), "code {code}");
        }
    }

    #[test]
    fn test_unlisted_client_codes_are_generic() {
        for code in [CR_UNKNOWN_ERROR, 2005, 2007, 2010, 2027, 2057] {
            assert_eq!(classify(code), Some(ErrorClass::Generic), "code {code}");
        }
    }

    #[test]
    fn test_server_codes() {
        assert_eq!(classify(ER_DUP_ENTRY), Some(ErrorClass::Generic));
        assert_eq!(classify(ER_NO_SUCH_TABLE), Some(ErrorClass::Generic));
        assert_eq!(classify(ER_LOCK_DEADLOCK), Some(ErrorClass::Retryable));
        assert_eq!(classify(ER_LOCK_WAIT_TIMEOUT), Some(ErrorClass::Retryable));
        assert!(!ErrorClass::Retryable.is_connection_lost());
    }
}
