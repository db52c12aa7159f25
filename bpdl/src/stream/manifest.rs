use crate::{
    credential::Credential,
    error::FetchError,
    logger::{Logger, debug, info, warning},
    utils,
};
use reqwest::{Client, StatusCode, Url, header};

/// Parsed media playlist with every uri already resolved against `base_uri`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub base_uri: Url,
    pub key_uri: Option<Url>,
    pub segments: Vec<Segment>,
}

/// One media segment, in playback order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub uri: Url,
    pub iv: Option<[u8; 16]>,
}

impl Manifest {
    pub fn is_encrypted(&self) -> bool {
        self.key_uri.is_some()
    }
}

#[derive(Debug)]
enum Parsed {
    Media(Manifest),
    Master(Url),
}

/// Fetches segmented-stream manifests with the bearer credential.
#[derive(Debug, Clone)]
pub struct ManifestFetcher {
    client: Client,
    user_agent: String,
    logger: Logger,
}

impl ManifestFetcher {
    pub fn new(user_agent: impl Into<String>, logger: Logger) -> Result<Self, FetchError> {
        Ok(Self {
            client: Client::builder().build()?,
            user_agent: user_agent.into(),
            logger,
        })
    }

    pub async fn fetch(
        &self,
        stream_url: &Url,
        credential: &Credential,
    ) -> Result<Manifest, FetchError> {
        let mut url = stream_url.clone();

        // A master playlist is followed once, to its highest bandwidth variant.
        for _ in 0..2 {
            match self.fetch_once(&url, credential).await? {
                Parsed::Media(manifest) => {
                    info!(
                        self.logger,
                        "Manifest has {} segments ({})",
                        manifest.segments.len(),
                        if manifest.is_encrypted() {
                            "AES-128"
                        } else {
                            "unencrypted"
                        }
                    );
                    return Ok(manifest);
                }
                Parsed::Master(variant) => {
                    info!(self.logger, "Following variant playlist {}", variant);
                    url = variant;
                }
            }
        }

        Err(FetchError::MalformedManifest(
            "variant playlist points to another master playlist".to_owned(),
        ))
    }

    async fn fetch_once(&self, url: &Url, credential: &Credential) -> Result<Parsed, FetchError> {
        let authorization = credential.authorization()?;
        debug!(
            self.logger,
            "GET {} (Authorization: Bearer {})",
            url,
            utils::redact(&credential.access_token)
        );

        let response = self
            .client
            .get(url.clone())
            .header(header::AUTHORIZATION, authorization)
            .header(header::CONNECTION, "Keep-Alive")
            .header(header::USER_AGENT, &self.user_agent)
            .send()
            .await?;

        let status = response.status();
        debug!(self.logger, "GET {} -> {}", url, status);

        match status {
            StatusCode::OK => (),
            StatusCode::UNAUTHORIZED => {
                return Err(FetchError::Unauthorized(utils::truncate_body(
                    response.text().await.unwrap_or_default(),
                )));
            }
            status => {
                return Err(FetchError::ManifestUnavailable {
                    status,
                    body: utils::truncate_body(response.text().await.unwrap_or_default()),
                });
            }
        }

        let final_url = response.url().clone();

        if &final_url != url {
            debug!(self.logger, "Manifest redirected to {}", final_url);
        }

        let bytes = response.bytes().await?;
        let parsed = parse(&bytes, &final_url)?;

        if let Parsed::Media(manifest) = &parsed
            && manifest.segments.iter().any(|x| x.iv.is_none())
            && manifest.is_encrypted()
        {
            warning!(
                self.logger,
                "Some segments declare no IV, an all-zero IV is used for them"
            );
        }

        Ok(parsed)
    }
}

/// Directory of the manifest url: last path component, query and fragment removed.
pub(crate) fn base_uri(manifest_url: &Url) -> Result<Url, FetchError> {
    manifest_url
        .join("./")
        .map_err(|x| FetchError::MalformedManifest(format!("cannot derive base uri: {}", x)))
}

fn parse(bytes: &[u8], manifest_url: &Url) -> Result<Parsed, FetchError> {
    let base = base_uri(manifest_url)?;
    let resolve = |uri: &str| {
        base.join(uri)
            .map_err(|x| FetchError::MalformedManifest(format!("invalid uri {:?}: {}", uri, x)))
    };

    let playlist = m3u8_rs::parse_playlist_res(bytes)
        .map_err(|_| FetchError::MalformedManifest("not a m3u8 playlist".to_owned()))?;

    let m3u8 = match playlist {
        m3u8_rs::Playlist::MediaPlaylist(x) => x,
        m3u8_rs::Playlist::MasterPlaylist(x) => {
            let variant = x
                .variants
                .iter()
                .filter(|x| !x.is_i_frame)
                .max_by_key(|x| x.bandwidth)
                .ok_or_else(|| {
                    FetchError::MalformedManifest("master playlist has no variants".to_owned())
                })?;

            return Ok(Parsed::Master(resolve(&variant.uri)?));
        }
    };

    // Only the first declared key is honoured, for the whole stream.
    let first_key = m3u8.segments.iter().find_map(|x| x.key.as_ref());
    let key_uri = match first_key {
        Some(m3u8_rs::Key {
            method: m3u8_rs::KeyMethod::AES128,
            uri: Some(uri),
            ..
        }) => Some(resolve(uri)?),
        Some(m3u8_rs::Key {
            method: m3u8_rs::KeyMethod::AES128,
            uri: None,
            ..
        }) => {
            return Err(FetchError::MalformedManifest(
                "AES-128 key without URI".to_owned(),
            ));
        }
        Some(m3u8_rs::Key {
            method: m3u8_rs::KeyMethod::SampleAES,
            ..
        }) => {
            return Err(FetchError::MalformedManifest(
                "SAMPLE-AES decryption is not supported".to_owned(),
            ));
        }
        Some(m3u8_rs::Key {
            method: m3u8_rs::KeyMethod::Other(x),
            ..
        }) => {
            return Err(FetchError::MalformedManifest(format!(
                "{} decryption is not supported",
                x
            )));
        }
        Some(_) | None => None,
    };

    let mut current_key = None;
    let mut segments = Vec::with_capacity(m3u8.segments.len());

    for segment in &m3u8.segments {
        if segment.key.is_some() {
            current_key = segment.key.as_ref();
        }

        let iv = match current_key.and_then(|x| x.iv.as_deref()) {
            Some(iv) => Some(parse_iv(iv)?),
            None => None,
        };

        segments.push(Segment {
            uri: resolve(&segment.uri)?,
            iv,
        });
    }

    Ok(Parsed::Media(Manifest {
        base_uri: base,
        key_uri,
        segments,
    }))
}

fn parse_iv(iv: &str) -> Result<[u8; 16], FetchError> {
    let digits = iv
        .strip_prefix("0x")
        .or_else(|| iv.strip_prefix("0X"))
        .unwrap_or(iv);

    let mut bytes = [0_u8; 16];
    hex::decode_to_slice(digits, &mut bytes)
        .map_err(|x| FetchError::MalformedManifest(format!("invalid IV {:?}: {}", iv, x)))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(x: &str) -> Url {
        x.parse().unwrap()
    }

    fn media(text: &str, manifest_url: &str) -> Manifest {
        match parse(text.as_bytes(), &url(manifest_url)).unwrap() {
            Parsed::Media(x) => x,
            Parsed::Master(x) => panic!("unexpected master playlist -> {}", x),
        }
    }

    const ENCRYPTED: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:10
#EXT-X-MEDIA-SEQUENCE:0
#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\",IV=0x000102030405060708090a0b0c0d0e0f
#EXTINF:10.0,
seg-0.aac
#EXTINF:10.0,
https://cdn.example.com/other/seg-1.aac
#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"
#EXTINF:10.0,
../seg-2.aac
#EXT-X-ENDLIST
";

    #[test]
    fn test_base_uri_strips_last_component() {
        assert_eq!(
            base_uri(&url("https://needledrop.beatport.com/a/b/track.m3u8?sig=1")).unwrap(),
            url("https://needledrop.beatport.com/a/b/")
        );
        assert_eq!(
            base_uri(&url("https://needledrop.beatport.com/track.m3u8")).unwrap(),
            url("https://needledrop.beatport.com/")
        );
    }

    #[test]
    fn test_uris_resolved_against_base() {
        let manifest = media(ENCRYPTED, "https://needledrop.beatport.com/a/b/track.m3u8?sig=1");

        assert_eq!(
            manifest.key_uri,
            Some(url("https://needledrop.beatport.com/a/b/key.bin"))
        );
        assert_eq!(
            manifest
                .segments
                .iter()
                .map(|x| x.uri.as_str())
                .collect::<Vec<_>>(),
            vec![
                "https://needledrop.beatport.com/a/b/seg-0.aac",
                "https://cdn.example.com/other/seg-1.aac",
                "https://needledrop.beatport.com/a/seg-2.aac",
            ]
        );
    }

    #[test]
    fn test_iv_follows_key_in_effect() {
        let manifest = media(ENCRYPTED, "https://needledrop.beatport.com/a/b/track.m3u8");
        let iv = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];

        assert_eq!(manifest.segments[0].iv, Some(iv));
        assert_eq!(manifest.segments[1].iv, Some(iv));
        assert_eq!(manifest.segments[2].iv, None);
    }

    #[test]
    fn test_unencrypted_manifest() {
        let manifest = media(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:10.0,\na.aac\n#EXTINF:10.0,\nb.aac\n#EXT-X-ENDLIST\n",
            "http://127.0.0.1/x/y.m3u8",
        );
        assert!(!manifest.is_encrypted());
        assert_eq!(manifest.segments.len(), 2);
    }

    #[test]
    fn test_method_none_means_no_key() {
        let manifest = media(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXT-X-KEY:METHOD=NONE\n#EXTINF:10.0,\na.aac\n#EXT-X-ENDLIST\n",
            "http://127.0.0.1/x/y.m3u8",
        );
        assert!(manifest.key_uri.is_none());
    }

    #[test]
    fn test_first_key_wins() {
        let manifest = media(
            "#EXTM3U
#EXT-X-TARGETDURATION:10
#EXT-X-KEY:METHOD=AES-128,URI=\"first.key\"
#EXTINF:10.0,
a.aac
#EXT-X-KEY:METHOD=AES-128,URI=\"second.key\"
#EXTINF:10.0,
b.aac
#EXT-X-ENDLIST
",
            "http://127.0.0.1/x/y.m3u8",
        );
        assert_eq!(manifest.key_uri, Some(url("http://127.0.0.1/x/first.key")));
    }

    #[test]
    fn test_sample_aes_is_rejected() {
        let result = parse(
            b"#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXT-X-KEY:METHOD=SAMPLE-AES,URI=\"k\"\n#EXTINF:10.0,\na.aac\n#EXT-X-ENDLIST\n",
            &url("http://127.0.0.1/x/y.m3u8"),
        );
        assert!(matches!(result, Err(FetchError::MalformedManifest(_))));
    }

    #[test]
    fn test_master_playlist_picks_highest_bandwidth() {
        let parsed = parse(
            b"#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=128000,CODECS=\"mp4a.40.2\"
low/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=256000,CODECS=\"mp4a.40.2\"
high/index.m3u8
",
            &url("http://127.0.0.1/x/master.m3u8"),
        )
        .unwrap();

        match parsed {
            Parsed::Master(x) => assert_eq!(x, url("http://127.0.0.1/x/high/index.m3u8")),
            Parsed::Media(_) => panic!("expected master playlist"),
        }
    }

    #[test]
    fn test_parse_iv() {
        assert_eq!(
            parse_iv("0X0000000000000000000000000000000A").unwrap()[15],
            10
        );
        assert!(parse_iv("0x0102").is_err());
        assert!(parse_iv("0xzz000000000000000000000000000000").is_err());
    }
}
