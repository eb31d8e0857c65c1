//! Cloud-init user-data emitter (C3 — external collaborator per the
//! component table; the core only consumes the returned string as opaque
//! bytes to hand to the provider).

/// Produce a first-boot YAML document: creates the `deploy` user with
/// passwordless sudo and `public_key` in `authorized_keys`, installs a base
/// package set, opens firewall ports 22/80/443, creates `B/<app_name>/`.
pub fn generate_user_data(username: &str, public_key: &str, app_name: &str) -> String {
    format!(
        r#"#cloud-config
users:
  - name: {username}
    sudo: ALL=(ALL) NOPASSWD:ALL
    shell: /bin/bash
    ssh_authorized_keys:
      - {public_key}

package_update: true
packages:
  - curl
  - git
  - ufw
  - nginx
  - build-essential

runcmd:
  - ufw allow 22
  - ufw allow 80
  - ufw allow 443
  - ufw --force enable
  - mkdir -p /srv/{app_name}/releases
  - mkdir -p /srv/{app_name}/shared/env
  - mkdir -p /srv/{app_name}/shared/logs
  - mkdir -p /srv/{app_name}/shared/static
  - mkdir -p /srv/{app_name}/shared/media
  - chown -R {username}:{username} /srv/{app_name}
"#,
        username = username,
        public_key = public_key.trim(),
        app_name = app_name,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeds_username_key_and_app_skeleton() {
        let doc = generate_user_data("deploy", "ssh-ed25519 AAAA... me@laptop", "widget");
        assert!(doc.contains("name: deploy"));
        assert!(doc.contains("ssh-ed25519 AAAA... me@laptop"));
        assert!(doc.contains("/srv/widget/releases"));
        assert!(doc.contains("ufw allow 443"));
    }
}
