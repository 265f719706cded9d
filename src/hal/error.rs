#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("LGW_HAL_ERROR")]
    Hal,

    #[error("LGW_CONF_ERROR")]
    Conf,

    #[error("LGW_RX_ERROR")]
    Receive,

    #[error("LGW_TX_ERROR")]
    Send,
}
