//! 账号池：匿名 → 已有令牌 → 自动注册新账号。
//!
//! 池只追加不删除；新账号先写回配置文件再拿去重试。

use std::path::PathBuf;
use std::sync::Mutex;

use rand::Rng;
use tracing::{debug, info, warn};

use super::error::DownloadError;
use super::models::Credential;
use crate::base_system::context::save_users;
use crate::network_parser::ComicApi;

const USERNAME_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const PASSWORD_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%^&*()";
const USERNAME_LEN: usize = 8;
const PASSWORD_LEN: usize = 16;

fn random_string(alphabet: &[u8], len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

pub struct CredentialPool {
    users: Mutex<Vec<Credential>>,
    /// 账号写回的配置文件；为 None 时只保存在内存里
    store: Option<PathBuf>,
}

impl CredentialPool {
    pub fn new(users: Vec<Credential>, store: Option<PathBuf>) -> Self {
        Self {
            users: Mutex::new(users),
            store,
        }
    }

    pub fn users(&self) -> Vec<Credential> {
        self.users.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 依次尝试匿名、池中每个有令牌的账号，全部失败后注册一个新账号再试一次。
    ///
    /// 任何失败都会进入下一步，最后一次尝试的错误原样返回。
    pub fn acquire<T>(
        &self,
        api: &dyn ComicApi,
        mut resolve: impl FnMut(Option<&str>) -> Result<T, DownloadError>,
    ) -> Result<T, DownloadError> {
        match resolve(None) {
            Ok(v) => return Ok(v),
            Err(err) => debug!(target: "credential", "匿名请求失败: {err}"),
        }

        let tokens: Vec<(String, String)> = self
            .users()
            .into_iter()
            .filter(Credential::has_token)
            .map(|c| (c.username, c.token))
            .collect();
        for (username, token) in &tokens {
            match resolve(Some(token)) {
                Ok(v) => return Ok(v),
                Err(err) => debug!(target: "credential", "账号 {username} 请求失败: {err}"),
            }
        }

        let fresh = self.provision(api)?;
        resolve(Some(&fresh.token))
    }

    fn provision(&self, api: &dyn ComicApi) -> Result<Credential, DownloadError> {
        let username = random_string(USERNAME_ALPHABET, USERNAME_LEN);
        let password = random_string(PASSWORD_ALPHABET, PASSWORD_LEN);

        info!(target: "credential", "所有账号均不可用，注册新账号 {username}");
        api.register(&username, &password)?;
        let token = api.login(&username, &password)?;

        let cred = Credential {
            username,
            password,
            token,
        };

        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        users.push(cred.clone());
        if let Some(path) = &self.store
            && let Err(err) = save_users(path, &users)
        {
            warn!(target: "credential", "保存账号失败 {}: {err}", path.display());
        }
        Ok(cred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base_system::config::load_or_create;
    use crate::base_system::context::Config;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 记录注册/登录次数的假接口。
    #[derive(Default)]
    struct FakeAuthApi {
        registers: AtomicUsize,
        logins: AtomicUsize,
        login_token: String,
    }

    impl ComicApi for FakeAuthApi {
        fn page_urls(
            &self,
            _path_word: &str,
            _chapter_id: &str,
            _token: Option<&str>,
        ) -> Result<Vec<String>, DownloadError> {
            Err(DownloadError::RateLimited)
        }

        fn register(&self, _username: &str, _password: &str) -> Result<(), DownloadError> {
            self.registers.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn login(&self, _username: &str, _password: &str) -> Result<String, DownloadError> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            Ok(self.login_token.clone())
        }

        fn fetch_page(&self, _url: &str) -> Result<Vec<u8>, DownloadError> {
            Err(DownloadError::Transport("unused".to_string()))
        }
    }

    fn accept_only<'a>(
        accepted: &'a str,
        calls: &'a mut Vec<Option<String>>,
    ) -> impl FnMut(Option<&str>) -> Result<u32, DownloadError> + 'a {
        move |token: Option<&str>| {
            calls.push(token.map(str::to_string));
            if token == Some(accepted) {
                Ok(7)
            } else {
                Err(DownloadError::RateLimited)
            }
        }
    }

    #[test]
    fn anonymous_success_skips_pool() {
        let api = FakeAuthApi::default();
        let pool = CredentialPool::new(Vec::new(), None);
        let got = pool.acquire(&api, |_| Ok::<_, DownloadError>("ok")).unwrap();
        assert_eq!(got, "ok");
        assert_eq!(api.registers.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stored_tokens_are_tried_in_order() {
        let api = FakeAuthApi::default();
        let users = vec![
            Credential {
                username: "a".into(),
                password: "p".into(),
                token: "old".into(),
            },
            Credential {
                username: "b".into(),
                password: "p".into(),
                token: String::new(),
            },
            Credential {
                username: "c".into(),
                password: "p".into(),
                token: "good".into(),
            },
        ];
        let pool = CredentialPool::new(users, None);
        let mut calls = Vec::new();
        let got = pool.acquire(&api, accept_only("good", &mut calls)).unwrap();

        assert_eq!(got, 7);
        assert_eq!(calls, vec![None, Some("old".to_string()), Some("good".to_string())]);
        assert_eq!(api.registers.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn exhausted_pool_registers_once_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "package_type: epub\n").unwrap();

        let api = FakeAuthApi {
            login_token: "fresh".to_string(),
            ..FakeAuthApi::default()
        };
        let pool = CredentialPool::new(Vec::new(), Some(path.clone()));
        let mut calls = Vec::new();
        let got = pool.acquire(&api, accept_only("fresh", &mut calls)).unwrap();

        assert_eq!(got, 7);
        assert_eq!(calls, vec![None, Some("fresh".to_string())]);
        assert_eq!(api.registers.load(Ordering::SeqCst), 1);
        assert_eq!(api.logins.load(Ordering::SeqCst), 1);

        let cfg: Config = load_or_create(&path).unwrap();
        assert_eq!(cfg.package_type, "epub");
        assert_eq!(cfg.user_list.len(), 1);
        assert_eq!(cfg.user_list[0].token, "fresh");
        assert_eq!(cfg.user_list[0].username.len(), USERNAME_LEN);
        assert_eq!(cfg.user_list[0].password.len(), PASSWORD_LEN);
    }

    #[test]
    fn final_failure_is_returned_as_is() {
        let api = FakeAuthApi {
            login_token: "fresh".to_string(),
            ..FakeAuthApi::default()
        };
        let pool = CredentialPool::new(Vec::new(), None);
        let err = pool
            .acquire(&api, |_| Err::<(), _>(DownloadError::Empty("nothing".into())))
            .unwrap_err();
        assert!(matches!(err, DownloadError::Empty(_)));
        assert_eq!(pool.users().len(), 1);
    }

    #[test]
    fn anonymous_not_found_still_tries_stored_tokens() {
        let api = FakeAuthApi::default();
        let users = vec![Credential {
            username: "a".into(),
            password: "p".into(),
            token: "good".into(),
        }];
        let pool = CredentialPool::new(users, None);
        let mut calls = Vec::new();
        let got = pool
            .acquire(&api, |token: Option<&str>| {
                calls.push(token.map(str::to_string));
                match token {
                    None => Err(DownloadError::NotFound("anonymous 404".into())),
                    Some(_) => Ok(3),
                }
            })
            .unwrap();

        assert_eq!(got, 3);
        assert_eq!(calls, vec![None, Some("good".to_string())]);
        assert_eq!(api.registers.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn generated_credentials_use_their_alphabets() {
        let name = random_string(USERNAME_ALPHABET, USERNAME_LEN);
        assert_eq!(name.len(), 8);
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric()));
        let pw = random_string(PASSWORD_ALPHABET, PASSWORD_LEN);
        assert!(pw.bytes().all(|b| PASSWORD_ALPHABET.contains(&b)));
    }
}
