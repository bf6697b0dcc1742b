//! 자격증명 복호화 seam
//!
//! 레지스트리 비밀번호는 설정에 암호화된 형태로만 저장되며,
//! 실제 사용 직전에 [`SecretDecryptor`]를 통해 복호화됩니다.
//! 복호화 구현(키 관리, HSM 연동 등)은 호스트 플랫폼의 책임이며
//! 이 크레이트는 인터페이스만 정의합니다.

use crate::error::QuaysideError;

/// 암호화된 비밀 값을 평문으로 복호화하는 collaborator
///
/// 구현체는 복호화된 평문을 저장하지 않아야 합니다.
/// 호출자 역시 반환값을 즉시 사용하고 버립니다.
pub trait SecretDecryptor: Send + Sync {
    /// 암호문을 평문으로 복호화합니다.
    ///
    /// # Errors
    ///
    /// 암호문이 손상되었거나 키를 사용할 수 없으면
    /// `QuaysideError::Crypto`를 반환합니다.
    fn decrypt(&self, ciphertext: &str) -> Result<String, QuaysideError>;
}

/// 개발/테스트용 복호화기 -- 입력을 그대로 반환합니다.
///
/// 운영 환경에서는 플랫폼의 키 스토어를 사용하는 구현체로 교체해야 합니다.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughDecryptor;

impl SecretDecryptor for PassthroughDecryptor {
    fn decrypt(&self, ciphertext: &str) -> Result<String, QuaysideError> {
        Ok(ciphertext.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_returns_input_unchanged() {
        let decryptor = PassthroughDecryptor;
        assert_eq!(decryptor.decrypt("s3cret").unwrap(), "s3cret");
    }

    #[test]
    fn decryptor_is_object_safe() {
        let decryptor: Box<dyn SecretDecryptor> = Box::new(PassthroughDecryptor);
        assert_eq!(decryptor.decrypt("x").unwrap(), "x");
    }

    #[test]
    fn failing_decryptor_propagates_error() {
        struct Broken;
        impl SecretDecryptor for Broken {
            fn decrypt(&self, _ciphertext: &str) -> Result<String, QuaysideError> {
                Err(QuaysideError::Crypto("key unavailable".to_owned()))
            }
        }
        let err = Broken.decrypt("anything").unwrap_err();
        assert!(err.to_string().contains("key unavailable"));
    }
}
