//! Protocol-buffer bodies exchanged with the pose server.
//!
//! Tags follow the field order of the server's schema and must not be
//! renumbered.

/// Body of the `PUT /sessions` response.
#[derive(Clone, PartialEq, prost::Message)]
pub struct CreateSessionResponse {
    #[prost(string, tag = "1")]
    pub session_id: String,
    /// Serialized overlay model.
    #[prost(bytes = "vec", tag = "2")]
    pub model: Vec<u8>,
}

/// Body of `POST /sessions/{id}`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TrackingRequest {
    #[prost(string, tag = "1")]
    pub session_id: String,
    /// 16-bit PNG, millimeters.
    #[prost(bytes = "vec", tag = "2")]
    pub depth_map: Vec<u8>,
    /// 8-bit RGB PNG.
    #[prost(bytes = "vec", tag = "3")]
    pub rgb_image: Vec<u8>,
    /// 3x3 intrinsics, row-major.
    #[prost(float, repeated, tag = "4")]
    pub intrinsics: Vec<f32>,
    /// 4x4 camera-to-world transform, row-major.
    #[prost(float, repeated, tag = "5")]
    pub transform: Vec<f32>,
    /// Lets the server assume small frame-to-frame motion.
    #[prost(bool, tag = "6")]
    pub optimize_for_speed: bool,
}

/// Body of the `POST /sessions/{id}` response.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TrackingResponse {
    /// 4x4 object pose in camera space, row-major.
    #[prost(float, repeated, tag = "1")]
    pub transform: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn tracking_request_fields_use_schema_tags() {
        let req = TrackingRequest {
            session_id: "s".into(),
            optimize_for_speed: true,
            ..Default::default()
        };
        let bytes = req.encode_to_vec();
        // tag 1, wire type 2 (length-delimited) + len 1 + 's'
        assert_eq!(&bytes[..3], &[0x0a, 0x01, b's']);
        // tag 6, wire type 0 (varint) + true
        assert_eq!(&bytes[3..], &[0x30, 0x01]);
    }

    #[test]
    fn tracking_response_decodes_packed_floats() {
        let resp = TrackingResponse {
            transform: vec![1.0, 0.0, 0.0, 0.5],
        };
        let back = TrackingResponse::decode(resp.encode_to_vec().as_slice()).unwrap();
        assert_eq!(back.transform, vec![1.0, 0.0, 0.0, 0.5]);
    }
}
