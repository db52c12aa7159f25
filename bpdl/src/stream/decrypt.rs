use super::{
    manifest::{Manifest, Segment},
    merger::Merger,
};
use crate::{
    credential::Credential,
    error::{DecryptError, FetchError},
    logger::{Logger, debug, info},
    utils,
};
use aes::cipher::{BlockDecryptMut, KeyIvInit, block_padding::NoPadding};
use reqwest::{Client, StatusCode, Url, header};
use std::fmt;
use tokio::task::JoinSet;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// AES-128 key shared read-only by every segment of one manifest.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EncryptionKey([u8; 16]);

impl EncryptionKey {
    pub fn new(key: [u8; 16]) -> Self {
        Self(key)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, FetchError> {
        let key = <[u8; 16]>::try_from(bytes).map_err(|_| FetchError::MalformedKey(bytes.len()))?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

#[derive(Clone)]
enum Decrypter {
    Aes128([u8; 16]),
    None,
}

impl Decrypter {
    fn new(key: Option<&EncryptionKey>) -> Self {
        match key {
            Some(key) => Self::Aes128(key.0),
            None => Self::None,
        }
    }

    /// Raw CBC block decryption. Padding is left in place, a missing IV means
    /// an all-zero IV.
    fn decrypt(
        &self,
        index: usize,
        iv: Option<[u8; 16]>,
        mut data: Vec<u8>,
    ) -> Result<Vec<u8>, DecryptError> {
        match self {
            Self::Aes128(key) => {
                let iv = iv.unwrap_or([0_u8; 16]);
                let len = data.len();

                Aes128CbcDec::new(key.into(), (&iv).into())
                    .decrypt_padded_mut::<NoPadding>(&mut data)
                    .map_err(|_| DecryptError::MalformedCiphertext { index, len })?;

                Ok(data)
            }
            Self::None => Ok(data),
        }
    }
}

/// Downloads the key and the segments of a manifest and decrypts them.
#[derive(Debug, Clone)]
pub struct SegmentDecryptor {
    client: Client,
    user_agent: String,
    concurrency: usize,
    logger: Logger,
}

impl SegmentDecryptor {
    pub fn new(
        user_agent: impl Into<String>,
        concurrency: usize,
        logger: Logger,
    ) -> Result<Self, FetchError> {
        Ok(Self {
            client: Client::builder().build()?,
            user_agent: user_agent.into(),
            concurrency: concurrency.max(1),
            logger,
        })
    }

    /// Fetches the 16 byte key. Called once per manifest.
    pub async fn fetch_key(
        &self,
        key_uri: &Url,
        credential: &Credential,
    ) -> Result<EncryptionKey, FetchError> {
        let authorization = credential.authorization()?;
        debug!(
            self.logger,
            "GET {} (Authorization: Bearer {})",
            key_uri,
            utils::redact(&credential.access_token)
        );

        let response = self
            .client
            .get(key_uri.clone())
            .header(header::AUTHORIZATION, authorization)
            .header(header::CONNECTION, "Keep-Alive")
            .header(header::USER_AGENT, &self.user_agent)
            .send()
            .await?;

        let status = response.status();
        debug!(self.logger, "GET {} -> {}", key_uri, status);

        match status {
            StatusCode::OK => EncryptionKey::from_slice(&response.bytes().await?),
            StatusCode::UNAUTHORIZED => Err(FetchError::Unauthorized(utils::truncate_body(
                response.text().await.unwrap_or_default(),
            ))),
            status => Err(FetchError::KeyUnavailable { status }),
        }
    }

    /// Downloads every segment and returns the decrypted stream in playback order.
    ///
    /// Downloads run concurrently, appends never do. The first failure aborts
    /// the remaining downloads and no partial output is returned.
    pub async fn decrypt_all(
        &self,
        manifest: &Manifest,
        key: Option<&EncryptionKey>,
    ) -> Result<Vec<u8>, DecryptError> {
        let total = manifest.segments.len();
        let decrypter = Decrypter::new(key);
        let mut merger = Merger::new(total);
        let mut pending = manifest.segments.iter().enumerate();
        let mut set = JoinSet::new();

        info!(self.logger, "Downloading {} segments", total);

        loop {
            while set.len() < self.concurrency {
                let Some((index, segment)) = pending.next() else {
                    break;
                };

                set.spawn(download_segment(
                    self.client.clone(),
                    decrypter.clone(),
                    index,
                    segment.clone(),
                ));
            }

            let Some(result) = set.join_next().await else {
                break;
            };

            let (index, data) = result.map_err(|x| DecryptError::Worker(x.to_string()))??;
            debug!(
                self.logger,
                "Segment {}/{} ready ({} bytes)",
                index + 1,
                total,
                data.len()
            );
            merger.write(index, data);
            merger.flush();
        }

        if !merger.buffered() {
            return Err(DecryptError::Worker(format!(
                "{} of {} segments were merged",
                merger.indexed(),
                total
            )));
        }

        info!(self.logger, "Merged {} bytes", merger.stored());
        Ok(merger.into_inner())
    }
}

/// Segment hosts do not take the bearer credential.
async fn download_segment(
    client: Client,
    decrypter: Decrypter,
    index: usize,
    segment: Segment,
) -> Result<(usize, Vec<u8>), DecryptError> {
    let response = client
        .get(segment.uri)
        .send()
        .await
        .map_err(|source| DecryptError::Http { index, source })?;

    let status = response.status();

    if status != StatusCode::OK {
        return Err(DecryptError::SegmentDownloadFailed { index, status });
    }

    let data = response
        .bytes()
        .await
        .map_err(|source| DecryptError::Http { index, source })?;

    Ok((index, decrypter.decrypt(index, segment.iv, data.to_vec())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::cipher::BlockEncryptMut;

    type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

    const KEY: [u8; 16] = *b"0123456789abcdef";

    fn encrypt(plain: &[u8], iv: [u8; 16]) -> Vec<u8> {
        let mut buf = plain.to_vec();
        let len = buf.len();
        Aes128CbcEnc::new((&KEY).into(), (&iv).into())
            .encrypt_padded_mut::<NoPadding>(&mut buf, len)
            .unwrap();
        buf
    }

    #[test]
    fn test_decrypt_with_iv() {
        let iv = [7_u8; 16];
        let plain = (0..48).collect::<Vec<u8>>();

        let out = Decrypter::Aes128(KEY)
            .decrypt(0, Some(iv), encrypt(&plain, iv))
            .unwrap();
        assert_eq!(out, plain);
    }

    #[test]
    fn test_missing_iv_equals_zero_iv() {
        let cipher = encrypt(&[0x42; 32], [0; 16]);
        let decrypter = Decrypter::Aes128(KEY);

        let implicit = decrypter.decrypt(0, None, cipher.clone()).unwrap();
        let explicit = decrypter.decrypt(0, Some([0; 16]), cipher).unwrap();

        assert_eq!(implicit, explicit);
        assert_eq!(implicit, vec![0x42; 32]);
    }

    #[test]
    fn test_no_key_passes_bytes_through() {
        let data = b"not a multiple of sixteen".to_vec();
        assert_eq!(
            Decrypter::new(None).decrypt(0, Some([1; 16]), data.clone()).unwrap(),
            data
        );
    }

    #[test]
    fn test_partial_block_is_rejected() {
        let result = Decrypter::Aes128(KEY).decrypt(5, None, vec![0; 17]);
        assert!(matches!(
            result,
            Err(DecryptError::MalformedCiphertext { index: 5, len: 17 })
        ));
    }

    #[test]
    fn test_key_must_be_16_bytes() {
        assert!(EncryptionKey::from_slice(&KEY).is_ok());
        assert!(matches!(
            EncryptionKey::from_slice(&[0; 15]),
            Err(FetchError::MalformedKey(15))
        ));
        assert_eq!(format!("{:?}", EncryptionKey::new(KEY)), "EncryptionKey(..)");
    }
}
